//! `amm inspect` – presence, size and optional checksum of a profile's models.

use amm_core::config::AmmConfig;
use amm_core::inventory::ChecksumStatus;
use amm_core::manager::AssetManager;
use anyhow::Result;

pub async fn run_inspect(cfg: &AmmConfig, bundle: &str, profile: &str, verify: bool) -> Result<()> {
    let manager = AssetManager::from_config(cfg).await?;
    let inspections = manager.inspect_bundle(bundle, profile, verify)?;

    println!("{:<24} {:<18} {:<12} {:<10} {}", "MODEL", "STATUS", "SIZE", "SHA256", "PATH");
    for i in inspections {
        let size = i
            .actual_size
            .map(|s| format!("{s}"))
            .unwrap_or_else(|| "-".to_string());
        let sha = match i.checksum {
            ChecksumStatus::NotDeclared => "-",
            ChecksumStatus::NotChecked => "unchecked",
            ChecksumStatus::Match => "ok",
            ChecksumStatus::Mismatch => "MISMATCH",
            ChecksumStatus::Unreadable => "unreadable",
        };
        let path = match (&i.destination, &i.error) {
            (Some(p), _) => p.display().to_string(),
            (None, Some(e)) => e.to_string(),
            (None, None) => "-".to_string(),
        };
        println!("{:<24} {:<18} {:<12} {:<10} {}", i.model_id, i.tag(), size, sha, path);
    }
    Ok(())
}
