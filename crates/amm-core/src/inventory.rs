//! Advisory inspection of installed assets: presence, declared vs actual size
//! and, on request, SHA-256. Nothing here changes what gets downloaded or
//! deleted.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::checksum::sha256_matches;
use crate::AmmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumStatus {
    /// The definition declares no digest.
    NotDeclared,
    /// A digest is declared but verification was not requested (or the asset is absent).
    NotChecked,
    Match,
    Mismatch,
    /// The file could not be read.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetInspection {
    pub model_id: String,
    pub destination: Option<PathBuf>,
    pub present: bool,
    /// File length; None for directories and absent assets.
    pub actual_size: Option<u64>,
    pub expected_size: Option<u64>,
    /// Present file whose length differs from the declared size.
    pub size_mismatch: bool,
    pub checksum: ChecksumStatus,
    /// Why the destination could not be resolved.
    pub error: Option<AmmError>,
}

impl AssetInspection {
    /// Inspection of a model whose destination did not resolve.
    pub fn unresolved(model_id: &str, expected_size: Option<u64>, error: AmmError) -> Self {
        Self {
            model_id: model_id.to_string(),
            destination: None,
            present: false,
            actual_size: None,
            expected_size,
            size_mismatch: false,
            checksum: ChecksumStatus::NotChecked,
            error: Some(error),
        }
    }

    /// Short tag for listings: "ok", "missing", "incorrect size", "checksum mismatch".
    pub fn tag(&self) -> &'static str {
        if self.error.is_some() {
            "unresolved"
        } else if !self.present {
            "missing"
        } else if self.checksum == ChecksumStatus::Mismatch {
            "checksum mismatch"
        } else if self.size_mismatch {
            "incorrect size"
        } else {
            "ok"
        }
    }
}

pub fn inspect_asset(
    model_id: &str,
    destination: &Path,
    expected_size: Option<u64>,
    sha256: Option<&str>,
    verify_checksum: bool,
) -> AssetInspection {
    let meta = std::fs::metadata(destination).ok();
    let present = meta.is_some();
    let actual_size = meta.as_ref().filter(|m| m.is_file()).map(|m| m.len());
    let size_mismatch = matches!((actual_size, expected_size), (Some(a), Some(e)) if a != e);

    let checksum = match sha256 {
        None => ChecksumStatus::NotDeclared,
        Some(_) if !verify_checksum || actual_size.is_none() => ChecksumStatus::NotChecked,
        Some(expected) => match sha256_matches(destination, expected) {
            Ok(true) => ChecksumStatus::Match,
            Ok(false) => ChecksumStatus::Mismatch,
            Err(e) => {
                tracing::warn!(path = %destination.display(), "checksum failed: {:#}", e);
                ChecksumStatus::Unreadable
            }
        },
    };
    if size_mismatch {
        tracing::warn!(
            path = %destination.display(),
            expected = expected_size.unwrap_or_default(),
            actual = actual_size.unwrap_or_default(),
            "present with incorrect size"
        );
    }

    AssetInspection {
        model_id: model_id.to_string(),
        destination: Some(destination.to_path_buf()),
        present,
        actual_size,
        expected_size,
        size_mismatch,
        checksum,
        error: None,
    }
}
