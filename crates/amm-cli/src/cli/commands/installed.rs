//! `amm installed` – list installed bundle profiles.

use amm_core::ledger::InstallLedger;
use anyhow::Result;

pub async fn run_installed() -> Result<()> {
    let ledger = InstallLedger::open_default().await?;
    let records = ledger.list_installed().await?;
    if records.is_empty() {
        println!("Nothing installed.");
        return Ok(());
    }
    println!("{:<24} {:<16} {}", "BUNDLE", "PROFILE", "INSTALLED_AT");
    for r in records {
        println!("{:<24} {:<16} {}", r.bundle_id, r.profile, r.installed_at);
    }
    Ok(())
}
