//! Streamed HTTP GET into a staging file.
//!
//! The body arrives in chunks of at most `chunk_size_bytes`. After each chunk
//! progress is updated from `Content-Length` (left at 0 when the server sends
//! none) and the cancel flag is checked. The progress callback also checks the
//! flag so a stalled connection still notices cancellation.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::str;

use super::headers::{percent, ResponseHead};
use super::TransferEnd;
use crate::config::TransferSettings;
use crate::credentials::PreparedRequest;
use crate::registry::TransferJob;
use crate::storage::PartFile;

/// Downloads `request` to the job's destination. Runs in the current thread;
/// call from `spawn_blocking`.
pub(super) fn download(
    job: &TransferJob,
    request: &PreparedRequest,
    settings: &TransferSettings,
) -> Result<TransferEnd> {
    let destination = job.destination();
    // Logged and reported by source URL; the prepared URL may carry a token.
    let shown_url = job.source().location();

    let part = RefCell::new(PartFile::create(destination)?);
    let head = RefCell::new(ResponseHead::default());
    let write_error: RefCell<Option<anyhow::Error>> = RefCell::new(None);

    let mut easy = curl::easy::Easy::new();
    let perform_result = configure(&mut easy, request, settings).and_then(|()| {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = str::from_utf8(data) {
                head.borrow_mut().feed(line);
            }
            true
        })?;
        transfer.write_function(|data| {
            if job.is_cancelled() {
                return Ok(0);
            }
            let mut part = part.borrow_mut();
            if let Err(e) = part.write_chunk(data) {
                write_error.borrow_mut().replace(e);
                return Ok(0);
            }
            if let Some(total) = head.borrow().total() {
                job.set_progress(percent(part.written(), total));
            }
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !job.is_cancelled())?;
        transfer.perform()
    });

    let part = part.into_inner();
    match perform_result {
        Ok(()) => {}
        Err(_) if job.is_cancelled() => {
            part.discard();
            tracing::info!(url = %shown_url, "download stopped");
            return Ok(TransferEnd::Stopped);
        }
        Err(e) => {
            part.discard();
            if let Some(io) = write_error.into_inner() {
                return Err(io.context(format!("GET {}", shown_url)));
            }
            return Err(anyhow::Error::new(e)).with_context(|| format!("GET {} failed", shown_url));
        }
    }

    let code = match easy.response_code() {
        Ok(code) => code,
        Err(e) => {
            part.discard();
            return Err(anyhow::Error::new(e)).context("no response code");
        }
    };
    if !(200..300).contains(&code) {
        part.discard();
        anyhow::bail!("GET {} returned HTTP {}", shown_url, code);
    }

    let temp = part.temp_path().to_path_buf();
    match part.finalize(destination) {
        Ok(written) => {
            tracing::debug!(url = %shown_url, bytes = written, "download complete");
            Ok(TransferEnd::Completed)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            Err(e)
        }
    }
}

fn configure(
    easy: &mut curl::easy::Easy,
    request: &PreparedRequest,
    settings: &TransferSettings,
) -> Result<(), curl::Error> {
    easy.url(&request.url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.fail_on_error(true)?;
    easy.useragent(concat!("amm/", env!("CARGO_PKG_VERSION")))?;
    easy.buffer_size(settings.chunk_size_bytes)?;
    easy.connect_timeout(settings.connect_timeout)?;
    easy.progress(true)?;

    let mut list = curl::easy::List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !request.headers.is_empty() {
        easy.http_headers(list)?;
    }
    Ok(())
}
