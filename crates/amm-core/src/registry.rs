//! Job registry: the in-memory authority for in-flight transfers.
//!
//! At most one live job exists per `AssetIdentity`. `begin` atomically looks
//! up or inserts under the registry lock, so exactly one caller becomes the
//! owner of a new job; everyone else joins it and waits on its completion
//! signal. Jobs leave the live map the moment they reach a terminal state.
//! Only the last terminal outcome per identity is remembered, for progress
//! queries, until a new job begins for that identity.
//!
//! Cancellation is cooperative: `request_stop` only sets the job's flag and
//! the owning executor observes it and performs the terminal transition.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::asset::{AssetIdentity, AssetSource};

/// Status as reported to callers polling progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Downloading,
    Done,
    Error,
    Stopped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Downloading => "downloading",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    Done,
    Error,
    Stopped,
}

impl From<TerminalState> for JobStatus {
    fn from(s: TerminalState) -> Self {
        match s {
            TerminalState::Done => JobStatus::Done,
            TerminalState::Error => JobStatus::Error,
            TerminalState::Stopped => JobStatus::Stopped,
        }
    }
}

/// Terminal state of a job plus its error message, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub state: TerminalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn done() -> Self {
        Self {
            state: TerminalState::Done,
            error: None,
        }
    }

    pub fn stopped() -> Self {
        Self {
            state: TerminalState::Stopped,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TerminalState::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TerminalState::Done
    }
}

/// Snapshot returned by progress queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub identity: AssetIdentity,
    pub progress: u8,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One live transfer. Progress and the terminal outcome are written only by
/// the owning executor (through the registry); the cancel flag by anyone.
#[derive(Debug)]
pub struct TransferJob {
    identity: AssetIdentity,
    source: AssetSource,
    destination: PathBuf,
    progress: AtomicU8,
    cancel: Arc<AtomicBool>,
    outcome_tx: watch::Sender<Option<JobOutcome>>,
}

impl TransferJob {
    fn new(identity: AssetIdentity, source: AssetSource, destination: PathBuf) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            identity,
            source,
            destination,
            progress: AtomicU8::new(0),
            cancel: Arc::new(AtomicBool::new(false)),
            outcome_tx,
        }
    }

    pub fn identity(&self) -> &AssetIdentity {
        &self.identity
    }

    pub fn source(&self) -> &AssetSource {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// Raise progress to `percent` (capped at 100). Never lowers it.
    pub fn set_progress(&self, percent: u8) {
        self.progress.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        (*self.outcome_tx.borrow()).clone()
    }

    pub fn status(&self) -> JobStatus {
        match self.outcome() {
            Some(o) => o.state.into(),
            None => JobStatus::Downloading,
        }
    }

    pub fn report(&self) -> ProgressReport {
        let outcome = self.outcome();
        ProgressReport {
            identity: self.identity.clone(),
            progress: self.progress(),
            status: outcome
                .as_ref()
                .map(|o| o.state.into())
                .unwrap_or(JobStatus::Downloading),
            error: outcome.and_then(|o| o.error),
        }
    }

    /// Wait until the job reaches a terminal state. Any number of callers may wait.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.outcome_tx.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => return JobOutcome::failed("job completion signal closed"),
        };
        outcome.unwrap_or_else(|| JobOutcome::failed("job finished without an outcome"))
    }
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    live: Mutex<HashMap<AssetIdentity, Arc<TransferJob>>>,
    outcomes: Mutex<HashMap<AssetIdentity, JobOutcome>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the job for `identity`. Returns `(job, true)` when the
    /// caller created it and must drive it to a terminal state, `(job, false)`
    /// when a live job already existed and the caller should wait on it.
    pub fn begin(
        &self,
        identity: AssetIdentity,
        source: AssetSource,
        destination: PathBuf,
    ) -> (Arc<TransferJob>, bool) {
        let mut live = self.live.lock().unwrap();
        if let Some(existing) = live.get(&identity) {
            return (Arc::clone(existing), false);
        }
        let job = Arc::new(TransferJob::new(identity.clone(), source, destination));
        self.outcomes.lock().unwrap().remove(&identity);
        live.insert(identity, Arc::clone(&job));
        (job, true)
    }

    /// Live job for `identity`, if any.
    pub fn get(&self, identity: &AssetIdentity) -> Option<Arc<TransferJob>> {
        self.live.lock().unwrap().get(identity).cloned()
    }

    /// All live jobs.
    pub fn active(&self) -> Vec<Arc<TransferJob>> {
        self.live.lock().unwrap().values().cloned().collect()
    }

    /// Move `job` to its terminal state, drop it from the live map and release
    /// every waiter. Only the first call per job has any effect; returns whether
    /// this call was it.
    pub fn finish(&self, job: &TransferJob, outcome: JobOutcome) -> bool {
        let mut live = self.live.lock().unwrap();
        if job.outcome_tx.borrow().is_some() {
            return false;
        }
        if live
            .get(&job.identity)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), job))
        {
            live.remove(&job.identity);
        }
        self.outcomes
            .lock()
            .unwrap()
            .insert(job.identity.clone(), outcome.clone());
        if outcome.is_done() {
            job.progress.store(100, Ordering::Release);
        }
        job.outcome_tx.send_replace(Some(outcome));
        true
    }

    /// Set the cancel flag of the live job for `identity`. Returns whether one was found.
    pub fn request_stop(&self, identity: &AssetIdentity) -> bool {
        match self.live.lock().unwrap().get(identity) {
            Some(job) => {
                job.cancel.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Terminal outcome of the most recent finished job for `identity`.
    pub fn last_outcome(&self, identity: &AssetIdentity) -> Option<JobOutcome> {
        self.outcomes.lock().unwrap().get(identity).cloned()
    }
}

/// Finishes its job as `error` if dropped before `finish` was called, so
/// waiters are never stranded by an executor task that unwinds.
pub struct FinishGuard {
    registry: Arc<JobRegistry>,
    job: Arc<TransferJob>,
}

impl FinishGuard {
    pub fn new(registry: Arc<JobRegistry>, job: Arc<TransferJob>) -> Self {
        Self { registry, job }
    }

    pub fn job(&self) -> &Arc<TransferJob> {
        &self.job
    }

    pub fn finish(self, outcome: JobOutcome) -> bool {
        self.registry.finish(&self.job, outcome)
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.job.outcome().is_none() {
            self.registry.finish(
                &self.job,
                JobOutcome::failed("transfer task ended without a result"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn begin(reg: &JobRegistry, id: &str) -> (Arc<TransferJob>, bool) {
        reg.begin(
            AssetIdentity::from(id),
            AssetSource::http(format!("https://example.com/{}", id)),
            PathBuf::from(format!("/m/{}", id)),
        )
    }

    #[test]
    fn begin_returns_existing_job_for_same_identity() {
        let reg = JobRegistry::new();
        let (a, new_a) = begin(&reg, "a.bin");
        let (b, new_b) = begin(&reg, "a.bin");
        assert!(new_a);
        assert!(!new_b);
        assert!(Arc::ptr_eq(&a, &b));
        let (_, new_c) = begin(&reg, "c.bin");
        assert!(new_c);
        assert_eq!(reg.active().len(), 2);
        assert_eq!(a.status(), JobStatus::Downloading);
    }

    #[test]
    fn concurrent_begin_yields_exactly_one_owner() {
        let reg = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || begin(&reg, "shared.bin").1)
            })
            .collect();
        let owners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn finish_releases_all_waiters_once() {
        let reg = Arc::new(JobRegistry::new());
        let (job, _) = begin(&reg, "w.bin");
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.wait().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(reg.finish(&job, JobOutcome::failed("boom")));
        assert!(!reg.finish(&job, JobOutcome::done()));

        for w in waiters {
            let outcome = w.await.unwrap();
            assert_eq!(outcome.state, TerminalState::Error);
            assert_eq!(outcome.error.as_deref(), Some("boom"));
        }
        assert!(reg.get(&AssetIdentity::from("w.bin")).is_none());
        // A waiter arriving after completion still sees the outcome.
        assert_eq!(job.wait().await.state, TerminalState::Error);
    }

    #[test]
    fn outcome_memo_is_cleared_by_new_job() {
        let reg = JobRegistry::new();
        let id = AssetIdentity::from("m.bin");
        let (job, _) = begin(&reg, "m.bin");
        reg.finish(&job, JobOutcome::stopped());
        assert_eq!(reg.last_outcome(&id), Some(JobOutcome::stopped()));

        let (job2, is_new) = begin(&reg, "m.bin");
        assert!(is_new);
        assert!(!Arc::ptr_eq(&job, &job2));
        assert_eq!(reg.last_outcome(&id), None);
    }

    #[test]
    fn finishing_stale_job_does_not_evict_successor() {
        let reg = JobRegistry::new();
        let (old, _) = begin(&reg, "s.bin");
        reg.finish(&old, JobOutcome::done());
        let (current, _) = begin(&reg, "s.bin");
        assert!(!reg.finish(&old, JobOutcome::failed("late")));
        assert!(reg.get(current.identity()).is_some());
    }

    #[test]
    fn request_stop_sets_flag_and_is_idempotent() {
        let reg = JobRegistry::new();
        let (job, _) = begin(&reg, "x.bin");
        let id = AssetIdentity::from("x.bin");
        assert!(!job.is_cancelled());
        assert!(reg.request_stop(&id));
        assert!(reg.request_stop(&id));
        assert!(job.is_cancelled());
        assert!(!reg.request_stop(&AssetIdentity::from("missing")));
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let reg = JobRegistry::new();
        let (job, _) = begin(&reg, "p.bin");
        job.set_progress(40);
        job.set_progress(10);
        assert_eq!(job.progress(), 40);
        job.set_progress(250);
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn done_forces_full_progress() {
        let reg = JobRegistry::new();
        let (job, _) = begin(&reg, "d.bin");
        reg.finish(&job, JobOutcome::done());
        let report = job.report();
        assert_eq!(report.progress, 100);
        assert_eq!(report.status, JobStatus::Done);
    }

    #[test]
    fn guard_finishes_job_on_drop() {
        let reg = Arc::new(JobRegistry::new());
        let (job, _) = begin(&reg, "g.bin");
        {
            let _guard = FinishGuard::new(Arc::clone(&reg), Arc::clone(&job));
        }
        let outcome = job.outcome().unwrap();
        assert_eq!(outcome.state, TerminalState::Error);
        assert!(reg.get(job.identity()).is_none());

        let (job2, _) = begin(&reg, "g.bin");
        let guard = FinishGuard::new(Arc::clone(&reg), Arc::clone(&job2));
        assert!(guard.finish(JobOutcome::done()));
        assert_eq!(job2.outcome(), Some(JobOutcome::done()));
    }
}
