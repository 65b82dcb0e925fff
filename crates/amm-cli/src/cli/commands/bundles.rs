//! `amm bundles` – list bundle definitions and their profiles.

use amm_core::bundle::{BundleLoader, JsonBundleLoader};
use amm_core::config::AmmConfig;
use anyhow::Result;

pub async fn run_bundles(cfg: &AmmConfig) -> Result<()> {
    let loader = JsonBundleLoader::new(cfg.bundles_dir()?);
    let ids = loader.list_bundle_ids()?;
    if ids.is_empty() {
        println!("No bundles in {}.", loader.dir().display());
        return Ok(());
    }
    println!("{:<24} {:<32} {}", "BUNDLE", "NAME", "PROFILES");
    for id in ids {
        match loader.load_bundle(&id) {
            Ok(bundle) => {
                let profiles: Vec<&str> = bundle.profiles.keys().map(String::as_str).collect();
                println!(
                    "{:<24} {:<32} {}",
                    bundle.id,
                    bundle.name.as_deref().unwrap_or("-"),
                    profiles.join(", ")
                );
            }
            Err(e) => println!("{:<24} {:<32} {}", id, "-", e),
        }
    }
    Ok(())
}
