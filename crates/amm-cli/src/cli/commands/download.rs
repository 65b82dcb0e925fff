//! `amm download` – fetch one asset, printing progress until it finishes.

use amm_core::asset::{AssetRequest, AssetSource, HttpSource};
use amm_core::config::AmmConfig;
use amm_core::credentials::ConfigCredentials;
use amm_core::locator::DirLocator;
use amm_core::orchestrator::Orchestrator;
use amm_core::registry::TerminalState;
use amm_core::url_model::filename_from_url_path;
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct DownloadArgs {
    pub source: String,
    pub dest: Option<String>,
    pub git: bool,
    pub git_ref: Option<String>,
    pub headers: Vec<String>,
}

/// Turn command-line arguments into an asset request. An HTTP download
/// without `--dest` is saved under the URL's file name.
pub fn build_request(args: &DownloadArgs) -> Result<AssetRequest> {
    if args.git {
        if !args.headers.is_empty() {
            bail!("--header only applies to HTTP downloads");
        }
        let source = AssetSource::git(args.source.trim(), args.git_ref.clone());
        return Ok(AssetRequest::new(source, args.dest.as_deref()));
    }

    let mut headers = HashMap::new();
    for raw in &args.headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("invalid header {:?}, expected NAME:VALUE", raw))?;
        if name.trim().is_empty() {
            bail!("invalid header {:?}, empty name", raw);
        }
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }
    let dest = match &args.dest {
        Some(d) => d.clone(),
        None => filename_from_url_path(&args.source)
            .ok_or_else(|| anyhow!("cannot derive a file name from {}; pass --dest", args.source))?,
    };
    let source = AssetSource::Http(HttpSource {
        url: args.source.trim().to_string(),
        headers,
        expected_size: None,
    });
    Ok(AssetRequest::new(source, Some(&dest)))
}

pub async fn run_download(cfg: &AmmConfig, args: DownloadArgs) -> Result<()> {
    let request = build_request(&args)?;
    let orchestrator = Orchestrator::new(
        Arc::new(DirLocator::new(cfg.models_dir()?)),
        Arc::new(ConfigCredentials::from_config(cfg)),
        cfg.transfer_settings(),
    );

    let started = orchestrator.start_download(&request)?;
    if started.already_exists() {
        println!("Already present: {}", started.destination.display());
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut stopping = false;
    let outcome = loop {
        tokio::select! {
            outcome = started.wait() => break outcome,
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                orchestrator.stop_download(&started.identity);
                eprintln!("\nstopping...");
            }
            _ = ticker.tick() => {
                let report = orchestrator.get_progress(&started.identity);
                eprint!(
                    "\r{:>3}% {:<11} {}",
                    report.progress,
                    report.status.as_str(),
                    started.destination.display()
                );
                let _ = std::io::stderr().flush();
            }
        }
    };
    eprintln!();

    match outcome.state {
        TerminalState::Done => {
            println!("Downloaded {}", started.destination.display());
            Ok(())
        }
        TerminalState::Stopped => bail!("download stopped"),
        TerminalState::Error => bail!(
            "download failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str) -> DownloadArgs {
        DownloadArgs {
            source: source.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn http_destination_defaults_to_file_name() {
        let req = build_request(&args("https://example.com/m/model.safetensors?x=1")).unwrap();
        assert_eq!(req.destination.as_deref(), Some("model.safetensors"));
        assert!(build_request(&args("https://example.com/")).is_err());
    }

    #[test]
    fn headers_are_parsed() {
        let mut a = args("https://example.com/a.bin");
        a.headers = vec!["X-Test: one".to_string(), "Accept:*/*".to_string()];
        let req = build_request(&a).unwrap();
        match req.source {
            AssetSource::Http(h) => {
                assert_eq!(h.headers.get("X-Test").map(String::as_str), Some("one"));
                assert_eq!(h.headers.get("Accept").map(String::as_str), Some("*/*"));
            }
            _ => panic!("expected http"),
        }
        a.headers = vec!["novalue".to_string()];
        assert!(build_request(&a).is_err());
    }

    #[test]
    fn git_keeps_missing_destination() {
        let mut a = args("https://github.com/org/nodes.git");
        a.git = true;
        a.git_ref = Some("main".to_string());
        let req = build_request(&a).unwrap();
        assert!(req.destination.is_none());
        assert_eq!(
            req.source,
            AssetSource::git("https://github.com/org/nodes.git", Some("main".to_string()))
        );
        a.headers = vec!["A: b".to_string()];
        assert!(build_request(&a).is_err());
    }
}
