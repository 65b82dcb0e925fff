//! `amm install` – install a bundle profile and optionally wait for its transfers.

use amm_core::config::AmmConfig;
use amm_core::manager::{AssetManager, InstallReport, WorkflowStatus};
use amm_core::registry::TerminalState;
use anyhow::{bail, Result};

pub async fn run_install(cfg: &AmmConfig, bundle: &str, profile: &str, wait: bool) -> Result<()> {
    let manager = AssetManager::from_config(cfg).await?;
    let report = manager.install_bundle(bundle, profile).await?;
    print_report(&report);

    let mut failed = report.errors.len();
    if wait && !report.started_model_ids.is_empty() {
        println!("Waiting for {} transfer(s)...", report.started_model_ids.len());
        let outcomes = tokio::select! {
            outcomes = report.wait_all() => outcomes,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("stopping transfers...");
                for (_, download) in report.downloads() {
                    manager.orchestrator().stop_download(&download.identity);
                }
                report.wait_all().await
            }
        };
        for (model_id, outcome) in outcomes {
            match outcome.state {
                TerminalState::Done => println!("  done     {}", model_id),
                TerminalState::Stopped => {
                    failed += 1;
                    println!("  stopped  {}", model_id);
                }
                TerminalState::Error => {
                    failed += 1;
                    println!(
                        "  error    {}: {}",
                        model_id,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }

    if failed > 0 {
        bail!("{} item(s) of {} / {} did not install", failed, bundle, profile);
    }
    Ok(())
}

fn print_report(report: &InstallReport) {
    println!("Bundle {} / {}", report.bundle_id, report.profile);
    for id in &report.started_model_ids {
        println!("  started  {}", id);
    }
    for id in &report.already_existing_ids {
        println!("  present  {}", id);
    }
    for w in &report.workflow_results {
        let status = match w.status {
            WorkflowStatus::Installed => "installed",
            WorkflowStatus::AlreadyExists => "present",
            WorkflowStatus::Failed => "failed",
        };
        println!("  workflow {:<9} {}", status, w.name);
    }
    for e in &report.errors {
        println!("  error    {}: {}", e.item, e.error);
    }
    if !report.recorded {
        println!("Installation not recorded: every item failed.");
    }
}
