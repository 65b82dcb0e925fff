//! Transfer executors: perform exactly one transfer for a job the caller owns.
//!
//! HTTP transfers run libcurl on a blocking thread; git checkouts run the git
//! binary as a child process polled from the async runtime. Both observe the
//! job's cancel flag (per chunk for HTTP, per poll for git), clean up their
//! staging path when stopped or failed, and never retry.

mod git;
mod headers;
mod http;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::asset::GitSource;
use crate::config::TransferSettings;
use crate::credentials::PreparedRequest;
use crate::registry::{JobOutcome, TransferJob};

/// What to run for a job; built (and authorized) before the job exists.
#[derive(Debug, Clone)]
pub enum TransferPlan {
    Http(PreparedRequest),
    Git(GitSource),
}

/// How a transfer that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEnd {
    Completed,
    Stopped,
}

/// Run `plan` for `job` and map the result to the job's terminal outcome.
pub async fn execute(
    job: Arc<TransferJob>,
    plan: TransferPlan,
    settings: &TransferSettings,
) -> JobOutcome {
    let result = match plan {
        TransferPlan::Http(request) => {
            let settings = settings.clone();
            let job = Arc::clone(&job);
            tokio::task::spawn_blocking(move || http::download(&job, &request, &settings))
                .await
                .context("download task join")
                .and_then(|r| r)
        }
        TransferPlan::Git(source) => git::checkout(&job, &source, settings).await,
    };
    outcome_of(result)
}

fn outcome_of(result: Result<TransferEnd>) -> JobOutcome {
    match result {
        Ok(TransferEnd::Completed) => JobOutcome::done(),
        Ok(TransferEnd::Stopped) => JobOutcome::stopped(),
        Err(e) => JobOutcome::failed(format!("{:#}", e)),
    }
}
