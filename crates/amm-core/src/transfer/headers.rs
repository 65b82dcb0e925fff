//! Incremental parsing of response header lines delivered by curl.
//!
//! curl reports the headers of every response it sees, including redirects,
//! so a new status line resets what was learned from the previous one.

/// Status and length of the most recent response seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
}

impl ResponseHead {
    /// Feed one raw header line (may include the trailing CRLF).
    pub fn feed(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.starts_with("HTTP/") {
            *self = ResponseHead {
                status: line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|code| code.parse().ok()),
                content_length: None,
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                self.content_length = value.trim().parse::<u64>().ok();
            }
        }
    }

    /// Known, non-zero total size of the body.
    pub fn total(&self) -> Option<u64> {
        self.content_length.filter(|n| *n > 0)
    }
}

/// Whole percent of `received` out of `total`, rounded down and capped at 100.
pub(crate) fn percent(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let p = (u128::from(received) * 100 / u128::from(total)).min(100);
    p as u8
}
