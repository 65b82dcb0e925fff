//! Resource locator: turns the raw destination of an asset descriptor into an
//! absolute path.
//!
//! The orchestrator only depends on the trait; `DirLocator` is the default
//! implementation rooted at the models directory.

use std::path::{Component, Path, PathBuf};

use crate::AmmError;

pub trait ResourceLocator: Send + Sync {
    /// Resolve `raw` to an absolute destination, or `PreconditionFailed`.
    fn resolve_destination(&self, raw: &str) -> Result<PathBuf, AmmError>;
}

/// Resolves relative destinations under a fixed root directory. Every path
/// it returns is lexically normalized, so one file has one spelling.
#[derive(Debug, Clone)]
pub struct DirLocator {
    root: PathBuf,
}

impl DirLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        Self {
            root: root.components().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLocator for DirLocator {
    fn resolve_destination(&self, raw: &str) -> Result<PathBuf, AmmError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AmmError::precondition("empty destination"));
        }
        let candidate = Path::new(raw);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AmmError::precondition(format!(
                "destination must not contain '..': {}",
                raw
            )));
        }
        if candidate.is_absolute() {
            // `components` drops `.` segments, repeated and trailing separators.
            let normalized: PathBuf = candidate.components().collect();
            if !normalized.starts_with(&self.root) {
                return Err(AmmError::precondition(format!(
                    "destination {} is outside {}",
                    raw,
                    self.root.display()
                )));
            }
            if normalized == self.root {
                return Err(AmmError::precondition(format!(
                    "destination {} is the models directory itself",
                    raw
                )));
            }
            return Ok(normalized);
        }
        let relative: PathBuf = candidate
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        if relative.as_os_str().is_empty() {
            return Err(AmmError::precondition(format!(
                "destination does not name a file: {}",
                raw
            )));
        }
        Ok(self.root.join(relative))
    }
}
