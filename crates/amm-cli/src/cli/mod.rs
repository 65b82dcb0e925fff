//! CLI for the amm asset and model manager.

mod commands;

use amm_core::config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::Path;

use commands::{
    run_bundles, run_checksum, run_completions, run_download, run_inspect, run_install,
    run_installed, run_manpage, run_uninstall, DownloadArgs,
};

/// Top-level CLI for amm.
#[derive(Debug, Parser)]
#[command(name = "amm")]
#[command(about = "amm: fetch, track and safely remove model assets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one asset and wait for it. Ctrl-C stops the transfer.
    Download {
        /// HTTP(S) URL, or a git remote with --git.
        source: String,

        /// Destination relative to the models directory (default: URL file name,
        /// or the repository name for git).
        #[arg(long, value_name = "PATH")]
        dest: Option<String>,

        /// Treat SOURCE as a git remote and clone it.
        #[arg(long)]
        git: bool,

        /// Branch, tag or commit to check out after cloning.
        #[arg(long = "ref", value_name = "REF", requires = "git")]
        git_ref: Option<String>,

        /// Extra request header, repeatable.
        #[arg(long = "header", value_name = "NAME:VALUE")]
        headers: Vec<String>,
    },

    /// Install a bundle profile: fetch its models and copy its workflows.
    Install {
        bundle: String,
        profile: String,

        /// Return once transfers are dispatched instead of waiting for them.
        #[arg(long)]
        no_wait: bool,
    },

    /// Uninstall a bundle profile, keeping assets other installations use.
    Uninstall { bundle: String, profile: String },

    /// List installed bundle profiles.
    Installed,

    /// List available bundle definitions.
    Bundles,

    /// Show presence and size of a profile's models.
    Inspect {
        bundle: String,
        profile: String,

        /// Also compare SHA-256 where the bundle declares one.
        #[arg(long)]
        verify: bool,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: String,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page.
    Manpage,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // Commands that need no configuration.
        match &cli.command {
            CliCommand::Checksum { path } => return run_checksum(Path::new(path)).await,
            CliCommand::Completions { shell } => return run_completions(*shell),
            CliCommand::Manpage => return run_manpage(),
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download {
                source,
                dest,
                git,
                git_ref,
                headers,
            } => {
                let args = DownloadArgs {
                    source,
                    dest,
                    git,
                    git_ref,
                    headers,
                };
                run_download(&cfg, args).await?
            }
            CliCommand::Install {
                bundle,
                profile,
                no_wait,
            } => run_install(&cfg, &bundle, &profile, !no_wait).await?,
            CliCommand::Uninstall { bundle, profile } => {
                run_uninstall(&cfg, &bundle, &profile).await?
            }
            CliCommand::Installed => run_installed().await?,
            CliCommand::Bundles => run_bundles(&cfg).await?,
            CliCommand::Inspect {
                bundle,
                profile,
                verify,
            } => run_inspect(&cfg, &bundle, &profile, verify).await?,
            CliCommand::Checksum { .. } | CliCommand::Completions { .. } | CliCommand::Manpage => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
