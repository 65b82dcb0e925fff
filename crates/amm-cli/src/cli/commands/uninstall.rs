//! `amm uninstall` – retire a bundle profile.

use amm_core::config::AmmConfig;
use amm_core::manager::AssetManager;
use anyhow::{bail, Result};

pub async fn run_uninstall(cfg: &AmmConfig, bundle: &str, profile: &str) -> Result<()> {
    let manager = AssetManager::from_config(cfg).await?;
    let report = manager.uninstall_bundle(bundle, profile).await?;

    println!("Uninstalled {} / {}", bundle, profile);
    for p in &report.deleted_models {
        println!("  deleted  {}", p.display());
    }
    for p in &report.deleted_workflows {
        println!("  deleted  {}", p.display());
    }
    for p in &report.kept_because_shared {
        println!("  kept     {} (shared)", p.display());
    }
    for p in &report.missing {
        println!("  missing  {}", p.display());
    }
    for e in &report.errors {
        println!("  error    {}", e);
    }
    if !report.errors.is_empty() {
        bail!("{} deletion(s) failed", report.errors.len());
    }
    Ok(())
}
