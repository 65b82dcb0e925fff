//! Download orchestrator: the public surface for fetching assets.
//!
//! For each request it resolves the destination, short-circuits when the
//! destination already exists, otherwise asks the registry to begin a job.
//! The caller that creates the job spawns its executor as an independent task
//! and returns right away; callers that find a live job join it instead.
//! Batches additionally never dispatch the same identity twice.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::asset::{AssetIdentity, AssetRequest, AssetSource};
use crate::config::TransferSettings;
use crate::credentials::{authorize, CredentialProvider};
use crate::locator::ResourceLocator;
use crate::registry::{
    FinishGuard, JobOutcome, JobRegistry, JobStatus, ProgressReport, TerminalState, TransferJob,
};
use crate::transfer::{self, TransferPlan};
use crate::url_model::checkout_name_for_remote;
use crate::AmmError;

/// What `start_download` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// A new job was created and its transfer started.
    Accepted,
    /// The destination was already on disk; no job was started.
    AlreadyExists,
    /// A live job for the same identity existed and was joined.
    JoinedExisting,
}

/// Handle to a dispatched, joined or skipped download.
#[derive(Debug, Clone)]
pub struct StartedDownload {
    pub identity: AssetIdentity,
    pub destination: PathBuf,
    pub disposition: Disposition,
    job: Option<Arc<TransferJob>>,
}

/// Serializable view of a `StartedDownload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub identity: AssetIdentity,
    pub accepted: bool,
    pub already_exists: bool,
    pub joined_existing: bool,
}

impl StartedDownload {
    pub fn accepted(&self) -> bool {
        self.disposition == Disposition::Accepted
    }

    pub fn already_exists(&self) -> bool {
        self.disposition == Disposition::AlreadyExists
    }

    pub fn joined_existing(&self) -> bool {
        self.disposition == Disposition::JoinedExisting
    }

    pub fn job(&self) -> Option<&Arc<TransferJob>> {
        self.job.as_ref()
    }

    /// Wait for the underlying job; a skipped download is already done.
    pub async fn wait(&self) -> JobOutcome {
        match &self.job {
            Some(job) => job.wait().await,
            None => JobOutcome::done(),
        }
    }

    pub fn report(&self) -> StartReport {
        StartReport {
            identity: self.identity.clone(),
            accepted: self.accepted(),
            already_exists: self.already_exists(),
            joined_existing: self.joined_existing(),
        }
    }

    /// The same download seen again later in one batch.
    fn as_repeat(&self) -> StartedDownload {
        let disposition = match self.disposition {
            Disposition::AlreadyExists => Disposition::AlreadyExists,
            Disposition::Accepted | Disposition::JoinedExisting => Disposition::JoinedExisting,
        };
        StartedDownload {
            disposition,
            ..self.clone()
        }
    }
}

/// Per-request result of a batch, positionally aligned with the input.
pub type BatchEntry = Result<StartedDownload, AmmError>;

pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    locator: Arc<dyn ResourceLocator>,
    credentials: Arc<dyn CredentialProvider>,
    settings: TransferSettings,
}

impl Orchestrator {
    pub fn new(
        locator: Arc<dyn ResourceLocator>,
        credentials: Arc<dyn CredentialProvider>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            locator,
            credentials,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Identity and absolute destination of `request`.
    ///
    /// A git request without destination is checked out into a directory named
    /// after its remote and keyed by the remote; an HTTP request needs one.
    pub fn locate(&self, request: &AssetRequest) -> Result<(AssetIdentity, PathBuf), AmmError> {
        if let Some(raw) = request.destination.as_deref() {
            let path = self.locator.resolve_destination(raw)?;
            return Ok((AssetIdentity::for_destination(&path), path));
        }
        match &request.source {
            AssetSource::Http(h) => Err(AmmError::precondition(format!(
                "no destination given for {}",
                h.url
            ))),
            AssetSource::Git(g) => {
                let name = checkout_name_for_remote(&g.remote).ok_or_else(|| {
                    AmmError::precondition(format!("cannot derive a checkout name from {}", g.remote))
                })?;
                let path = self.locator.resolve_destination(&name)?;
                Ok((AssetIdentity::for_remote(&g.remote), path))
            }
        }
    }

    /// Start (or join, or skip) one download. Returns as soon as the transfer
    /// is dispatched; use `StartedDownload::wait` for the terminal outcome.
    /// Must be called from within a Tokio runtime.
    pub fn start_download(&self, request: &AssetRequest) -> Result<StartedDownload, AmmError> {
        let (identity, destination) = self.locate(request)?;
        self.start_located(request, identity, destination)
    }

    /// Start one download and wait for its terminal outcome.
    pub async fn download(&self, request: &AssetRequest) -> Result<JobOutcome, AmmError> {
        let started = self.start_download(request)?;
        Ok(started.wait().await)
    }

    /// Start every request of a batch. A request whose identity was already
    /// dispatched earlier in the batch is not dispatched again; it reports the
    /// earlier handle. Failures stay local to their entry.
    pub fn download_batch(&self, requests: &[AssetRequest]) -> Vec<BatchEntry> {
        let mut dispatched: HashMap<AssetIdentity, StartedDownload> = HashMap::new();
        requests
            .iter()
            .map(|request| -> BatchEntry {
                let (identity, destination) = self.locate(request)?;
                if let Some(first) = dispatched.get(&identity) {
                    tracing::debug!(identity = %identity, "repeated in batch, not dispatched again");
                    return Ok(first.as_repeat());
                }
                let started = self.start_located(request, identity.clone(), destination)?;
                dispatched.insert(identity, started.clone());
                Ok(started)
            })
            .collect()
    }

    /// Progress of the live job for `identity`, else its last outcome, else
    /// `done` if the asset it names is on disk, else `idle`.
    pub fn get_progress(&self, identity: &AssetIdentity) -> ProgressReport {
        if let Some(job) = self.registry.get(identity) {
            return job.report();
        }
        if let Some(outcome) = self.registry.last_outcome(identity) {
            return ProgressReport {
                identity: identity.clone(),
                progress: if outcome.is_done() { 100 } else { 0 },
                status: outcome.state.into(),
                error: outcome.error,
            };
        }
        let on_disk = self
            .destination_of(identity)
            .map_or(false, |path| path.exists());
        ProgressReport {
            identity: identity.clone(),
            progress: if on_disk { 100 } else { 0 },
            status: if on_disk { JobStatus::Done } else { JobStatus::Idle },
            error: None,
        }
    }

    /// Request cooperative cancellation. Returns whether a live job was found.
    pub fn stop_download(&self, identity: &AssetIdentity) -> bool {
        let found = self.registry.request_stop(identity);
        if found {
            tracing::info!(identity = %identity, "stop requested");
        }
        found
    }

    /// Progress of every live job, ordered by identity.
    pub fn active_downloads(&self) -> Vec<ProgressReport> {
        let mut reports: Vec<ProgressReport> =
            self.registry.active().iter().map(|j| j.report()).collect();
        reports.sort_by(|a, b| a.identity.cmp(&b.identity));
        reports
    }

    /// On-disk location named by an identity: the destination itself, or for
    /// a remote the checkout directory `locate` derives from it.
    fn destination_of(&self, identity: &AssetIdentity) -> Option<PathBuf> {
        let raw = identity.as_str();
        if Path::new(raw).is_absolute() {
            return Some(PathBuf::from(raw));
        }
        let name = checkout_name_for_remote(raw)?;
        self.locator.resolve_destination(&name).ok()
    }

    fn start_located(
        &self,
        request: &AssetRequest,
        identity: AssetIdentity,
        destination: PathBuf,
    ) -> Result<StartedDownload, AmmError> {
        if destination.exists() {
            warn_on_size_mismatch(&destination, request.expected_size());
            tracing::debug!(identity = %identity, "destination present, skipping");
            return Ok(StartedDownload {
                identity,
                destination,
                disposition: Disposition::AlreadyExists,
                job: None,
            });
        }

        let plan = self.plan(request)?;

        let (job, is_new) =
            self.registry
                .begin(identity.clone(), request.source.clone(), destination.clone());
        if !is_new {
            tracing::debug!(identity = %identity, "joining live job");
            return Ok(StartedDownload {
                identity,
                destination,
                disposition: Disposition::JoinedExisting,
                job: Some(job),
            });
        }

        // A job for this identity may have completed between the existence
        // check and `begin`.
        if destination.exists() {
            self.registry.finish(&job, JobOutcome::done());
            return Ok(StartedDownload {
                identity,
                destination,
                disposition: Disposition::AlreadyExists,
                job: None,
            });
        }

        self.spawn_transfer(Arc::clone(&job), plan);
        Ok(StartedDownload {
            identity,
            destination,
            disposition: Disposition::Accepted,
            job: Some(job),
        })
    }

    /// Validate and authorize `request`; fails before any job exists.
    fn plan(&self, request: &AssetRequest) -> Result<TransferPlan, AmmError> {
        match &request.source {
            AssetSource::Http(http) => {
                let parsed = url::Url::parse(&http.url)
                    .map_err(|e| AmmError::precondition(format!("invalid URL {}: {}", http.url, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AmmError::precondition(format!(
                        "unsupported URL scheme: {}",
                        http.url
                    )));
                }
                Ok(TransferPlan::Http(authorize(http, self.credentials.as_ref())?))
            }
            AssetSource::Git(git) => {
                if git.remote.trim().is_empty() {
                    return Err(AmmError::precondition("empty git remote"));
                }
                let option_like = std::iter::once(git.remote.as_str())
                    .chain(git.git_ref.as_deref())
                    .find(|v| v.trim_start().starts_with('-'));
                if let Some(value) = option_like {
                    return Err(AmmError::precondition(format!(
                        "git remote or ref must not start with '-': {}",
                        value
                    )));
                }
                Ok(TransferPlan::Git(git.clone()))
            }
        }
    }

    fn spawn_transfer(&self, job: Arc<TransferJob>, plan: TransferPlan) {
        let guard = FinishGuard::new(Arc::clone(&self.registry), job);
        let settings = self.settings.clone();
        tokio::spawn(async move {
            let job = Arc::clone(guard.job());
            tracing::info!(identity = %job.identity(), source = %job.source().location(), "transfer started");
            let outcome = transfer::execute(Arc::clone(&job), plan, &settings).await;
            match outcome.state {
                TerminalState::Done => tracing::info!(identity = %job.identity(), "transfer done"),
                TerminalState::Stopped => tracing::info!(identity = %job.identity(), "transfer stopped"),
                TerminalState::Error => tracing::warn!(
                    identity = %job.identity(),
                    "transfer failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            }
            guard.finish(outcome);
        });
    }
}

/// Size comparison is advisory: a mismatch is logged, never acted on.
fn warn_on_size_mismatch(destination: &Path, expected: Option<u64>) {
    let Some(expected) = expected else {
        return;
    };
    if let Ok(meta) = std::fs::metadata(destination) {
        if meta.is_file() && meta.len() != expected {
            tracing::warn!(
                path = %destination.display(),
                expected,
                actual = meta.len(),
                "present with incorrect size"
            );
        }
    }
}
