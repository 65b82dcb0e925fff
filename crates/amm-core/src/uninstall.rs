//! Uninstall resolution: which assets of a retired (bundle, profile) pair are
//! no longer referenced by any remaining installation, and their deletion.
//!
//! `plan_removal` is pure set arithmetic over resolved references; `remove_planned`
//! deletes the candidates through an `AssetRemover`, recording each failure
//! separately and carrying on with the rest.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::asset::AssetIdentity;
use crate::storage::remove_path;
use crate::AmmError;

/// A model referenced by an installation, resolved to its on-disk location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModelRef {
    pub identity: AssetIdentity,
    pub path: PathBuf,
}

/// Everything one or more installations reference.
#[derive(Debug, Clone, Default)]
pub struct References {
    pub models: BTreeSet<ModelRef>,
    pub workflows: BTreeSet<PathBuf>,
}

impl References {
    pub fn add_model(&mut self, identity: AssetIdentity, path: PathBuf) {
        self.models.insert(ModelRef { identity, path });
    }

    pub fn add_workflow(&mut self, path: PathBuf) {
        self.workflows.insert(path);
    }

    pub fn extend(&mut self, other: References) {
        self.models.extend(other.models);
        self.workflows.extend(other.workflows);
    }

    /// A model is retained when a remaining reference is the same path, lies
    /// inside it (a file under a checkout) or contains it.
    fn retains_model(&self, path: &Path) -> bool {
        self.models
            .iter()
            .any(|m| m.path.starts_with(path) || path.starts_with(&m.path))
    }
}

/// Candidates for deletion and the references kept because they are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub models: Vec<ModelRef>,
    pub workflows: Vec<PathBuf>,
    pub kept_because_shared: Vec<PathBuf>,
}

/// `target` minus `retained`. Workflows compare by path; models compare by
/// path containment, so a checkout holding a retained asset is never a
/// candidate.
pub fn plan_removal(target: &References, retained: &References) -> RemovalPlan {
    let mut plan = RemovalPlan::default();
    for model in &target.models {
        if retained.retains_model(&model.path) {
            plan.kept_because_shared.push(model.path.clone());
        } else if !plan.models.iter().any(|m| m.path == model.path) {
            plan.models.push(model.clone());
        }
    }
    for workflow in &target.workflows {
        if retained.workflows.contains(workflow) {
            plan.kept_because_shared.push(workflow.clone());
        } else {
            plan.workflows.push(workflow.clone());
        }
    }
    plan
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UninstallReport {
    pub deleted_models: Vec<PathBuf>,
    pub deleted_workflows: Vec<PathBuf>,
    pub kept_because_shared: Vec<PathBuf>,
    /// Candidates that were already gone.
    pub missing: Vec<PathBuf>,
    pub errors: Vec<AmmError>,
}

/// Deletes an asset from disk.
pub trait AssetRemover: Send + Sync {
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// Removes files directly and directories (git checkouts) recursively.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

impl AssetRemover for FsRemover {
    fn remove(&self, path: &Path) -> std::io::Result<()> {
        remove_path(path)
    }
}

/// Delete every candidate of `plan`. Never stops early.
pub fn remove_planned(plan: RemovalPlan, remover: &dyn AssetRemover) -> UninstallReport {
    let mut report = UninstallReport {
        kept_because_shared: plan.kept_because_shared,
        ..Default::default()
    };
    for model in plan.models {
        if let Some(path) = remove_one(&model.path, remover, &mut report) {
            report.deleted_models.push(path);
        }
    }
    for workflow in plan.workflows {
        if let Some(path) = remove_one(&workflow, remover, &mut report) {
            report.deleted_workflows.push(path);
        }
    }
    report
}

fn remove_one(
    path: &Path,
    remover: &dyn AssetRemover,
    report: &mut UninstallReport,
) -> Option<PathBuf> {
    if std::fs::symlink_metadata(path).is_err() {
        report.missing.push(path.to_path_buf());
        return None;
    }
    match remover.remove(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "deleted");
            Some(path.to_path_buf())
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "could not delete: {}", e);
            report.errors.push(AmmError::cleanup(path, e.to_string()));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn refs(models: &[&str], workflows: &[&str]) -> References {
        let mut r = References::default();
        for m in models {
            r.add_model(AssetIdentity::from(*m), PathBuf::from(m));
        }
        for w in workflows {
            r.add_workflow(PathBuf::from(w));
        }
        r
    }

    #[test]
    fn shared_references_are_kept() {
        let target = refs(&["/m/a", "/m/shared"], &["/w/a.json", "/w/shared.json"]);
        let retained = refs(&["/m/shared", "/m/other"], &["/w/shared.json"]);
        let plan = plan_removal(&target, &retained);
        assert_eq!(plan.models.len(), 1);
        assert_eq!(plan.models[0].path, PathBuf::from("/m/a"));
        assert_eq!(plan.workflows, vec![PathBuf::from("/w/a.json")]);
        assert_eq!(
            plan.kept_because_shared,
            vec![PathBuf::from("/m/shared"), PathBuf::from("/w/shared.json")]
        );
    }

    #[test]
    fn nothing_retained_removes_everything() {
        let target = refs(&["/m/a", "/m/b"], &["/w/a.json"]);
        let plan = plan_removal(&target, &References::default());
        assert_eq!(plan.models.len(), 2);
        assert_eq!(plan.workflows.len(), 1);
        assert!(plan.kept_because_shared.is_empty());
    }

    #[test]
    fn same_path_under_two_identities_is_one_candidate() {
        let mut target = References::default();
        target.add_model(AssetIdentity::from("/m/nodes"), PathBuf::from("/m/nodes"));
        target.add_model(
            AssetIdentity::from("https://github.com/org/nodes.git"),
            PathBuf::from("/m/nodes"),
        );
        let plan = plan_removal(&target, &References::default());
        assert_eq!(plan.models.len(), 1);
    }

    #[test]
    fn checkout_containing_retained_asset_is_kept() {
        let target = refs(&["/m/custom_nodes/pack", "/m/a.bin"], &[]);
        let retained = refs(&["/m/custom_nodes/pack/weights/m.bin"], &[]);
        let plan = plan_removal(&target, &retained);
        assert_eq!(plan.models.len(), 1);
        assert_eq!(plan.models[0].path, PathBuf::from("/m/a.bin"));
        assert_eq!(
            plan.kept_because_shared,
            vec![PathBuf::from("/m/custom_nodes/pack")]
        );
    }

    #[test]
    fn asset_inside_retained_checkout_is_kept() {
        let target = refs(&["/m/nodes/pack/extra.bin"], &[]);
        let retained = refs(&["/m/nodes/pack"], &[]);
        let plan = plan_removal(&target, &retained);
        assert!(plan.models.is_empty());
        assert_eq!(
            plan.kept_because_shared,
            vec![PathBuf::from("/m/nodes/pack/extra.bin")]
        );
    }

    #[test]
    fn sibling_with_common_prefix_is_not_shared() {
        let target = refs(&["/m/pack"], &[]);
        let retained = refs(&["/m/pack2/m.bin"], &[]);
        let plan = plan_removal(&target, &retained);
        assert_eq!(plan.models.len(), 1);
        assert!(plan.kept_because_shared.is_empty());
    }

    struct FailingFor {
        path: PathBuf,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl AssetRemover for FailingFor {
        fn remove(&self, path: &Path) -> std::io::Result<()> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            if path == self.path {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                ));
            }
            remove_path(path)
        }
    }

    #[test]
    fn failures_are_recorded_and_do_not_stop_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let checkout = dir.path().join("nodes");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        std::fs::create_dir_all(checkout.join("sub")).unwrap();
        std::fs::write(checkout.join("sub/file"), b"x").unwrap();
        let gone = dir.path().join("gone.json");

        let mut target = References::default();
        for p in [&a, &b, &checkout] {
            target.add_model(AssetIdentity::for_destination(p), p.clone());
        }
        target.add_workflow(gone.clone());
        let plan = plan_removal(&target, &References::default());

        let remover = FailingFor {
            path: a.clone(),
            seen: Mutex::new(Vec::new()),
        };
        let report = remove_planned(plan, &remover);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), "cleanup_failure");
        assert!(a.exists());
        assert!(!b.exists());
        assert!(!checkout.exists());
        assert_eq!(report.deleted_models.len(), 2);
        assert_eq!(report.missing, vec![gone]);
        assert_eq!(remover.seen.lock().unwrap().len(), 3);
    }
}
