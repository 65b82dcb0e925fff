//! SHA-256 of downloaded files, computed on demand for inspection.
//!
//! Transfers never hash; a declared digest is only compared when asked.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Lowercase hex SHA-256 of the file at `path`, read in bounded chunks.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut chunk)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file's digest equals `expected` (hex, any case, surrounding
/// whitespace ignored).
pub fn sha256_matches(path: &Path, expected: &str) -> Result<bool> {
    let actual = sha256_path(path)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn digest_of_empty_and_known_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        let hello = dir.path().join("hello.txt");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&hello, b"hello\n").unwrap();
        assert_eq!(sha256_path(&empty).unwrap(), EMPTY);
        assert_eq!(sha256_path(&hello).unwrap(), HELLO);
    }

    #[test]
    fn comparison_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let hello = dir.path().join("hello.txt");
        std::fs::write(&hello, b"hello\n").unwrap();
        assert!(sha256_matches(&hello, &HELLO.to_ascii_uppercase()).unwrap());
        assert!(!sha256_matches(&hello, EMPTY).unwrap());
        assert!(sha256_path(&dir.path().join("missing")).is_err());
    }
}
