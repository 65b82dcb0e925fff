//! Asset descriptors: what to fetch, from where, and the key that deduplicates it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Deduplication key for a transfer: the resolved destination path, or the git
/// remote when the request carried no destination. Two requests with equal
/// identities refer to the same artifact and never transfer concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetIdentity(String);

impl AssetIdentity {
    pub fn for_destination(path: &Path) -> Self {
        AssetIdentity(path.to_string_lossy().into_owned())
    }

    pub fn for_remote(remote: &str) -> Self {
        AssetIdentity(remote.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetIdentity {
    fn from(s: &str) -> Self {
        AssetIdentity(s.to_string())
    }
}

/// Plain HTTP(S) download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSource {
    pub url: String,
    /// Extra request headers (e.g. from a bundle definition).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Declared size in bytes. Advisory: never blocks a skip or a download.
    #[serde(default)]
    pub expected_size: Option<u64>,
}

/// Git checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub remote: String,
    /// Branch, tag or commit to check out after cloning.
    #[serde(default)]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetSource {
    Http(HttpSource),
    Git(GitSource),
}

impl AssetSource {
    pub fn http(url: impl Into<String>) -> Self {
        AssetSource::Http(HttpSource {
            url: url.into(),
            headers: HashMap::new(),
            expected_size: None,
        })
    }

    pub fn git(remote: impl Into<String>, git_ref: Option<String>) -> Self {
        AssetSource::Git(GitSource {
            remote: remote.into(),
            git_ref,
        })
    }

    /// URL or remote, for logging and error messages.
    pub fn location(&self) -> &str {
        match self {
            AssetSource::Http(h) => &h.url,
            AssetSource::Git(g) => &g.remote,
        }
    }
}

/// One asset to make present on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    pub source: AssetSource,
    /// Raw destination as written by the caller; resolved by a `ResourceLocator`.
    #[serde(default)]
    pub destination: Option<String>,
    /// Optional SHA-256 carried through for inspection; transfers never verify it.
    #[serde(default)]
    pub sha256: Option<String>,
}

impl AssetRequest {
    pub fn new(source: AssetSource, destination: Option<&str>) -> Self {
        Self {
            source,
            destination: destination.map(str::to_string),
            sha256: None,
        }
    }

    pub fn expected_size(&self) -> Option<u64> {
        match &self.source {
            AssetSource::Http(h) => h.expected_size,
            AssetSource::Git(_) => None,
        }
    }
}
