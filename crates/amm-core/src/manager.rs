//! Bundle installation and uninstallation on top of the orchestrator.
//!
//! Install dispatches every model of a profile as one batch, copies its
//! workflow files and records the (bundle, profile) pair in the ledger.
//! Uninstall removes the ledger record first, then deletes only what no
//! remaining installation still references.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bundle::{BundleDefinition, BundleLoader, JsonBundleLoader, ProfileDefinition};
use crate::config::AmmConfig;
use crate::credentials::ConfigCredentials;
use crate::inventory::{inspect_asset, AssetInspection};
use crate::ledger::{InstallLedger, InstallationRecord};
use crate::locator::DirLocator;
use crate::orchestrator::{BatchEntry, Disposition, Orchestrator, StartedDownload};
use crate::registry::JobOutcome;
use crate::uninstall::{
    plan_removal, remove_planned, AssetRemover, FsRemover, References, UninstallReport,
};
use crate::url_model::is_plain_file_name;
use crate::AmmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Installed,
    AlreadyExists,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowResult {
    pub name: String,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AmmError>,
}

/// One failed item of an install, by model id or workflow name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub item: String,
    pub error: AmmError,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub bundle_id: String,
    pub profile: String,
    /// Models now transferring: newly dispatched or joined.
    pub started_model_ids: Vec<String>,
    pub already_existing_ids: Vec<String>,
    pub workflow_results: Vec<WorkflowResult>,
    pub errors: Vec<ItemError>,
    /// Whether the pair was recorded in the ledger.
    pub recorded: bool,
    #[serde(skip)]
    downloads: Vec<(String, StartedDownload)>,
}

impl InstallReport {
    /// Handles of the transfers started or joined by this install.
    pub fn downloads(&self) -> impl Iterator<Item = (&str, &StartedDownload)> {
        self.downloads.iter().map(|(id, d)| (id.as_str(), d))
    }

    /// Wait for every transfer this install started or joined.
    pub async fn wait_all(&self) -> Vec<(String, JobOutcome)> {
        let mut outcomes = Vec::with_capacity(self.downloads.len());
        for (model_id, download) in &self.downloads {
            outcomes.push((model_id.clone(), download.wait().await));
        }
        outcomes
    }
}

pub struct AssetManager {
    orchestrator: Arc<Orchestrator>,
    ledger: InstallLedger,
    loader: Arc<dyn BundleLoader>,
    remover: Arc<dyn AssetRemover>,
    workflows_dir: PathBuf,
}

impl AssetManager {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        ledger: InstallLedger,
        loader: Arc<dyn BundleLoader>,
        remover: Arc<dyn AssetRemover>,
        workflows_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            ledger,
            loader,
            remover,
            workflows_dir: workflows_dir.into(),
        }
    }

    /// Manager over the configured directories, the default ledger and
    /// filesystem deletion.
    pub async fn from_config(cfg: &AmmConfig) -> anyhow::Result<Self> {
        let orchestrator = Orchestrator::new(
            Arc::new(DirLocator::new(cfg.models_dir()?)),
            Arc::new(ConfigCredentials::from_config(cfg)),
            cfg.transfer_settings(),
        );
        let ledger = InstallLedger::open_default().await?;
        Ok(Self::new(
            Arc::new(orchestrator),
            ledger,
            Arc::new(JsonBundleLoader::new(cfg.bundles_dir()?)),
            Arc::new(FsRemover),
            cfg.workflows_dir()?,
        ))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn workflows_dir(&self) -> &Path {
        &self.workflows_dir
    }

    pub async fn list_installed(&self) -> Result<Vec<InstallationRecord>, AmmError> {
        self.ledger
            .list_installed()
            .await
            .map_err(|e| AmmError::ledger(&e))
    }

    /// Dispatch a profile's models, copy its workflows and record the
    /// installation. Returns once transfers are dispatched; see
    /// `InstallReport::wait_all`. The pair is recorded unless every item of a
    /// non-empty profile failed.
    pub async fn install_bundle(
        &self,
        bundle_id: &str,
        profile: &str,
    ) -> Result<InstallReport, AmmError> {
        let bundle = self.loader.load_bundle(bundle_id)?;
        let definition = bundle.profile(profile)?;

        let mut report = InstallReport {
            bundle_id: bundle_id.to_string(),
            profile: profile.to_string(),
            ..Default::default()
        };

        for (model_id, entry) in self.dispatch_models(definition) {
            match entry {
                Ok(started) => match started.disposition {
                    Disposition::AlreadyExists => report.already_existing_ids.push(model_id),
                    Disposition::Accepted | Disposition::JoinedExisting => {
                        report.started_model_ids.push(model_id.clone());
                        report.downloads.push((model_id, started));
                    }
                },
                Err(error) => {
                    tracing::warn!(bundle = bundle_id, model = %model_id, "model not dispatched: {}", error);
                    report.errors.push(ItemError {
                        item: model_id,
                        error,
                    });
                }
            }
        }

        for name in &definition.workflows {
            let result = self.install_workflow(&bundle, name).await;
            if let Some(error) = &result.error {
                report.errors.push(ItemError {
                    item: name.clone(),
                    error: error.clone(),
                });
            }
            report.workflow_results.push(result);
        }

        let items = definition.models.len() + definition.workflows.len();
        if items > 0 && report.errors.len() == items {
            tracing::warn!(bundle = bundle_id, profile, "every item failed, not recording installation");
        } else {
            self.ledger
                .append(bundle_id, profile)
                .await
                .map_err(|e| AmmError::ledger(&e))?;
            report.recorded = true;
            tracing::info!(
                bundle = bundle_id,
                profile,
                started = report.started_model_ids.len(),
                present = report.already_existing_ids.len(),
                "installation recorded"
            );
        }
        Ok(report)
    }

    /// Retire one installation: drop its ledger record, then delete every
    /// asset and workflow no remaining installation references. Deletion
    /// failures are reported per asset; the record stays removed.
    pub async fn uninstall_bundle(
        &self,
        bundle_id: &str,
        profile: &str,
    ) -> Result<UninstallReport, AmmError> {
        let record = self
            .ledger
            .get(bundle_id, profile)
            .await
            .map_err(|e| AmmError::ledger(&e))?;
        if record.is_none() {
            return Err(AmmError::not_found(format!(
                "installation {} / {}",
                bundle_id, profile
            )));
        }
        let bundle = self.loader.load_bundle(bundle_id)?;
        let definition = bundle.profile(profile)?;

        self.ledger
            .remove(bundle_id, profile)
            .await
            .map_err(|e| AmmError::ledger(&e))?;
        tracing::info!(bundle = bundle_id, profile, "installation record removed");

        let target = self.references(&bundle, definition);
        let retained = self.retained_references().await?;
        let plan = plan_removal(&target, &retained);

        // A candidate still being transferred belongs to its executor until
        // the job is terminal.
        for model in &plan.models {
            for job in self.orchestrator.registry().active() {
                if job.identity() == &model.identity || job.destination() == model.path {
                    self.orchestrator.stop_download(job.identity());
                    let outcome = job.wait().await;
                    tracing::debug!(identity = %job.identity(), state = ?outcome.state, "live transfer ended before delete");
                }
            }
        }

        let report = remove_planned(plan, self.remover.as_ref());
        tracing::info!(
            bundle = bundle_id,
            profile,
            deleted = report.deleted_models.len() + report.deleted_workflows.len(),
            kept = report.kept_because_shared.len(),
            failed = report.errors.len(),
            "uninstall finished"
        );
        Ok(report)
    }

    /// Advisory per-model inspection of an installed or planned profile.
    pub fn inspect_bundle(
        &self,
        bundle_id: &str,
        profile: &str,
        verify_checksums: bool,
    ) -> Result<Vec<AssetInspection>, AmmError> {
        let bundle = self.loader.load_bundle(bundle_id)?;
        let definition = bundle.profile(profile)?;
        Ok(definition
            .models
            .iter()
            .map(|model| {
                let located = model
                    .to_request()
                    .and_then(|req| self.orchestrator.locate(&req).map(|(_, path)| (req, path)));
                match located {
                    Ok((req, path)) => inspect_asset(
                        &model.id,
                        &path,
                        req.expected_size(),
                        req.sha256.as_deref(),
                        verify_checksums,
                    ),
                    Err(e) => AssetInspection::unresolved(&model.id, model.size, e),
                }
            })
            .collect())
    }

    /// Model ids paired with their batch results, in definition order.
    fn dispatch_models(&self, definition: &ProfileDefinition) -> Vec<(String, BatchEntry)> {
        let requests: Vec<Result<_, AmmError>> =
            definition.models.iter().map(|m| m.to_request()).collect();
        let valid: Vec<_> = requests.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
        let mut dispatched = self.orchestrator.download_batch(&valid).into_iter();
        definition
            .models
            .iter()
            .zip(requests)
            .map(|(model, request)| {
                let entry = request.and_then(|_| {
                    dispatched
                        .next()
                        .unwrap_or_else(|| Err(AmmError::precondition("batch result missing")))
                });
                (model.id.clone(), entry)
            })
            .collect()
    }

    async fn install_workflow(&self, bundle: &BundleDefinition, name: &str) -> WorkflowResult {
        let failed = |error: AmmError| WorkflowResult {
            name: name.to_string(),
            status: WorkflowStatus::Failed,
            error: Some(error),
        };
        let source = match bundle.workflow_source(name) {
            Ok(s) => s,
            Err(e) => return failed(e),
        };
        let target = self.workflows_dir.join(name);
        if target.exists() {
            return WorkflowResult {
                name: name.to_string(),
                status: WorkflowStatus::AlreadyExists,
                error: None,
            };
        }
        if !source.is_file() {
            return failed(AmmError::not_found(format!(
                "workflow file {}",
                source.display()
            )));
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.workflows_dir).await {
            return failed(AmmError::transfer(format!(
                "create {}: {}",
                self.workflows_dir.display(),
                e
            )));
        }
        match tokio::fs::copy(&source, &target).await {
            Ok(_) => {
                tracing::debug!(workflow = name, path = %target.display(), "workflow installed");
                WorkflowResult {
                    name: name.to_string(),
                    status: WorkflowStatus::Installed,
                    error: None,
                }
            }
            Err(e) => failed(AmmError::transfer(format!(
                "copy {} to {}: {}",
                source.display(),
                target.display(),
                e
            ))),
        }
    }

    /// Resolved model destinations and workflow paths of one profile.
    /// Entries that do not resolve reference nothing.
    fn references(&self, bundle: &BundleDefinition, definition: &ProfileDefinition) -> References {
        let mut refs = References::default();
        for model in &definition.models {
            let located = model
                .to_request()
                .and_then(|req| self.orchestrator.locate(&req));
            match located {
                Ok((identity, path)) => refs.add_model(identity, path),
                Err(e) => {
                    tracing::warn!(bundle = %bundle.id, model = %model.id, "unresolvable model skipped: {}", e)
                }
            }
        }
        for name in &definition.workflows {
            if is_plain_file_name(name) {
                refs.add_workflow(self.workflows_dir.join(name));
            }
        }
        refs
    }

    /// Union of the references of every remaining installation. Records whose
    /// bundle or profile no longer loads are skipped.
    async fn retained_references(&self) -> Result<References, AmmError> {
        let mut retained = References::default();
        for record in self.list_installed().await? {
            let bundle = match self.loader.load_bundle(&record.bundle_id) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(bundle = %record.bundle_id, "skipping installed bundle: {}", e);
                    continue;
                }
            };
            match bundle.profile(&record.profile) {
                Ok(definition) => retained.extend(self.references(&bundle, definition)),
                Err(e) => {
                    tracing::warn!(bundle = %record.bundle_id, profile = %record.profile, "skipping installed profile: {}", e)
                }
            }
        }
        Ok(retained)
    }
}
