//! URL helpers: host extraction, checkout names for git remotes, plain file names.

/// Lowercased host of `url`, or None if it does not parse.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// True if `host` equals `domain` or is a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Extracts the last path segment from a URL.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Directory name for a checkout of `remote`: last path segment without `.git`.
///
/// Accepts URLs (`https://host/org/repo.git`) and scp-like remotes
/// (`git@host:org/repo.git`).
pub fn checkout_name_for_remote(remote: &str) -> Option<String> {
    let remote = remote.trim().trim_end_matches('/');
    let last = match url::Url::parse(remote) {
        Ok(_) => filename_from_url_path(remote)?,
        Err(_) => remote.rsplit(|c| c == '/' || c == ':').next()?.to_string(),
    };
    let name = last.strip_suffix(".git").unwrap_or(&last);
    if is_plain_file_name(name) {
        Some(name.to_string())
    } else {
        None
    }
}

/// A single path component: non-empty, no separators, NUL, or dot-only names.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}
