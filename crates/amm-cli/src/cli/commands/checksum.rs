//! `amm checksum` – SHA-256 of a file, in `sha256sum` format.

use amm_core::checksum;
use anyhow::Result;
use std::path::Path;

pub async fn run_checksum(path: &Path) -> Result<()> {
    let digest = checksum::sha256_path(path)?;
    println!("{}  {}", digest, path.display());
    Ok(())
}
