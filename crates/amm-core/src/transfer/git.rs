//! Git checkouts via the git binary.
//!
//! Clones into `<destination>.part`, optionally checks out a ref, then renames
//! onto the destination. The child is polled at a fixed interval; between
//! polls the cancel flag is checked and, if set, the child is killed and the
//! staging directory removed. A child that has already exited wins over a
//! late cancellation.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::TransferEnd;
use crate::asset::GitSource;
use crate::config::TransferSettings;
use crate::registry::TransferJob;
use crate::storage::{finalize, remove_path, temp_path};

pub(super) async fn checkout(
    job: &TransferJob,
    source: &GitSource,
    settings: &TransferSettings,
) -> Result<TransferEnd> {
    let destination = job.destination();
    if destination.exists() {
        tracing::debug!(path = %destination.display(), "checkout already present");
        return Ok(TransferEnd::Completed);
    }

    let staging = temp_path(destination);
    remove_path(&staging)
        .with_context(|| format!("remove stale staging dir {}", staging.display()))?;
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
    }

    let mut clone = git_command(settings);
    clone
        .arg("clone")
        .arg("--quiet")
        .arg("--")
        .arg(&source.remote)
        .arg(&staging);
    let mut end = run_polled(job, clone, "clone", settings.git_poll_interval).await;

    let cloned = matches!(end, Ok(TransferEnd::Completed));
    if let Some(git_ref) = source.git_ref.as_deref().filter(|_| cloned) {
        let mut checkout = git_command(settings);
        checkout
            .arg("-C")
            .arg(&staging)
            .arg("checkout")
            .arg("--quiet")
            .arg(git_ref);
        end = run_polled(job, checkout, "checkout", settings.git_poll_interval).await;
    }

    match end {
        Ok(TransferEnd::Completed) => {
            finalize(&staging, destination)?;
            tracing::debug!(remote = %source.remote, path = %destination.display(), "checkout complete");
            Ok(TransferEnd::Completed)
        }
        other => {
            discard_staging(&staging);
            if matches!(other, Ok(TransferEnd::Stopped)) {
                tracing::info!(remote = %source.remote, "checkout stopped");
            }
            other
        }
    }
}

fn git_command(settings: &TransferSettings) -> Command {
    let mut cmd = Command::new(&settings.git_binary);
    cmd.env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn `cmd` and poll it until it exits or the job is cancelled.
async fn run_polled(
    job: &TransferJob,
    mut cmd: Command,
    what: &str,
    interval: Duration,
) -> Result<TransferEnd> {
    let program = cmd.as_std().get_program().to_owned();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {} {}", display(&program), what))?;

    // Drain stderr concurrently so a chatty child cannot block on a full pipe.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut s) = stderr {
            let _ = s.read_to_string(&mut buf).await;
        }
        buf
    });

    loop {
        if let Some(status) = child.try_wait().context("poll git process")? {
            let stderr = stderr_task.await.unwrap_or_default();
            if status.success() {
                return Ok(TransferEnd::Completed);
            }
            anyhow::bail!("git {} failed ({}): {}", what, status, stderr.trim());
        }
        if job.is_cancelled() {
            child.kill().await.context("kill git process")?;
            stderr_task.abort();
            return Ok(TransferEnd::Stopped);
        }
        tokio::time::sleep(interval).await;
    }
}

fn discard_staging(staging: &Path) {
    if let Err(e) = remove_path(staging) {
        tracing::warn!(path = %staging.display(), "could not remove staging dir: {}", e);
    }
}

fn display(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}
