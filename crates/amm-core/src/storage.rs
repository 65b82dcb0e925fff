//! Staging files and their lifecycle.
//!
//! Transfers write to `<destination>.part` and atomically rename onto the
//! destination when complete, so an existing destination always means a
//! finished transfer. Cancelled or failed transfers discard the `.part`.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the staging file or directory.
pub const TEMP_SUFFIX: &str = ".part";

/// Staging path: appends `.part` to the final path (`a.safetensors` → `a.safetensors.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Remove a file or a directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Atomically rename a finished staging path onto `final_path`.
pub fn finalize(temp: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp, final_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp.display(),
            final_path.display()
        )
    })
}

/// Sequential writer for an HTTP staging file.
pub struct PartFile {
    file: File,
    temp_path: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create (truncating) the staging file for `final_path`, creating parent dirs.
    pub fn create(final_path: &Path) -> Result<Self> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let temp_path = temp_path(final_path);
        let file = File::create(&temp_path)
            .with_context(|| format!("create staging file {}", temp_path.display()))?;
        Ok(Self {
            file,
            temp_path,
            written: 0,
        })
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("write {}", self.temp_path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Sync and rename onto `final_path`. Consumes the writer and closes the file.
    pub fn finalize(self, final_path: &Path) -> Result<u64> {
        self.file.sync_all().context("storage sync failed")?;
        let written = self.written;
        let temp = self.temp_path.clone();
        drop(self.file);
        finalize(&temp, final_path)?;
        Ok(written)
    }

    /// Close and delete the staging file.
    pub fn discard(self) {
        let temp = self.temp_path.clone();
        drop(self.file);
        if let Err(e) = fs::remove_file(&temp) {
            tracing::warn!(path = %temp.display(), "could not remove staging file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("model.safetensors"));
        assert_eq!(p.to_string_lossy(), "model.safetensors.part");
        let p2 = temp_path(Path::new("/m/custom_nodes/repo"));
        assert_eq!(p2.to_string_lossy(), "/m/custom_nodes/repo.part");
    }

    #[test]
    fn write_and_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("nested/out.bin");
        let mut part = PartFile::create(&final_path).unwrap();
        part.write_chunk(b"hello ").unwrap();
        part.write_chunk(b"world").unwrap();
        assert_eq!(part.written(), 11);
        let tp = part.temp_path().to_path_buf();
        assert!(tp.exists());
        assert_eq!(part.finalize(&final_path).unwrap(), 11);
        assert!(!tp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello world");
    }

    #[test]
    fn discard_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("out.bin");
        let mut part = PartFile::create(&final_path).unwrap();
        part.write_chunk(b"partial").unwrap();
        let tp = part.temp_path().to_path_buf();
        part.discard();
        assert!(!tp.exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn remove_path_handles_files_dirs_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f.bin");
        std::fs::write(&f, b"x").unwrap();
        let d = dir.path().join("repo");
        std::fs::create_dir_all(d.join(".git/objects")).unwrap();
        std::fs::write(d.join("README"), b"r").unwrap();

        remove_path(&f).unwrap();
        remove_path(&d).unwrap();
        remove_path(&dir.path().join("missing")).unwrap();
        assert!(!f.exists());
        assert!(!d.exists());
    }
}
