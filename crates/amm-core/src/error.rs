//! Error taxonomy surfaced to callers of the orchestration API.
//!
//! Per-item failures inside batch calls are carried as values in the result
//! lists; only structural problems (ledger unavailable, unknown bundle) abort
//! a whole call.

use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmmError {
    /// Missing required credential or an invalid/unresolvable destination.
    /// Raised before any transfer job exists.
    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    /// Network, process or filesystem failure while a transfer was running.
    #[error("transfer failed: {message}")]
    TransferFailed { message: String },

    /// Bundle, profile or installation record does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Deleting one asset during uninstall failed.
    #[error("cleanup failed for {}: {message}", path.display())]
    CleanupFailure { path: PathBuf, message: String },

    /// The installation ledger could not be read or written.
    #[error("ledger: {message}")]
    Ledger { message: String },
}

impl AmmError {
    pub fn precondition(message: impl Into<String>) -> Self {
        AmmError::PreconditionFailed {
            message: message.into(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        AmmError::TransferFailed {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AmmError::NotFound {
            message: message.into(),
        }
    }

    pub fn cleanup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AmmError::CleanupFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wraps an internal ledger error, keeping the full context chain.
    pub fn ledger(err: &anyhow::Error) -> Self {
        AmmError::Ledger {
            message: format!("{:#}", err),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            AmmError::PreconditionFailed { .. } => "precondition_failed",
            AmmError::TransferFailed { .. } => "transfer_failed",
            AmmError::NotFound { .. } => "not_found",
            AmmError::CleanupFailure { .. } => "cleanup_failure",
            AmmError::Ledger { .. } => "ledger",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let e = AmmError::precondition("token required for civitai");
        assert_eq!(e.to_string(), "precondition failed: token required for civitai");
        assert_eq!(e.kind(), "precondition_failed");
    }

    #[test]
    fn cleanup_failure_names_path() {
        let e = AmmError::cleanup("/models/a.bin", "permission denied");
        assert_eq!(
            e.to_string(),
            "cleanup failed for /models/a.bin: permission denied"
        );
        assert_eq!(e.kind(), "cleanup_failure");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let e = AmmError::not_found("bundle sdxl");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["message"], "bundle sdxl");
    }

    #[test]
    fn ledger_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk I/O error").context("remove installation");
        let e = AmmError::ledger(&inner);
        assert_eq!(e.to_string(), "ledger: remove installation: disk I/O error");
    }
}
