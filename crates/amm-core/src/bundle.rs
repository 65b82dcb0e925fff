//! Bundle definitions: per hardware profile, the models to fetch and the
//! workflow files to install. Read-only input to install and uninstall.
//!
//! `JsonBundleLoader` reads `<bundles_dir>/<bundle_id>.json`; workflow files
//! ship next to it in `<bundles_dir>/<bundle_id>/workflows/`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::asset::{AssetRequest, AssetSource, GitSource, HttpSource};
use crate::url_model::is_plain_file_name;
use crate::AmmError;

/// One model entry of a profile: an HTTP file or a git checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub git: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    /// Path relative to the models directory.
    #[serde(default)]
    pub destination: Option<String>,
    /// Declared size in bytes (advisory).
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ModelDefinition {
    /// The asset request for this model. Exactly one of `url` / `git` must be set.
    pub fn to_request(&self) -> Result<AssetRequest, AmmError> {
        let source = match (&self.url, &self.git) {
            (Some(url), None) => AssetSource::Http(HttpSource {
                url: url.clone(),
                headers: self.headers.clone(),
                expected_size: self.size,
            }),
            (None, Some(remote)) => AssetSource::Git(GitSource {
                remote: remote.clone(),
                git_ref: self.git_ref.clone(),
            }),
            _ => {
                return Err(AmmError::precondition(format!(
                    "model {} must set exactly one of url or git",
                    self.id
                )))
            }
        };
        Ok(AssetRequest {
            source,
            destination: self.destination.clone(),
            sha256: self.sha256.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
    /// Workflow file names.
    #[serde(default)]
    pub workflows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileDefinition>,
    /// Where this bundle's workflow files live; set by the loader.
    #[serde(skip)]
    pub workflow_dir: Option<PathBuf>,
}

impl BundleDefinition {
    pub fn profile(&self, name: &str) -> Result<&ProfileDefinition, AmmError> {
        self.profiles.get(name).ok_or_else(|| {
            AmmError::not_found(format!("profile {} in bundle {}", name, self.id))
        })
    }

    /// Source file of workflow `name`.
    pub fn workflow_source(&self, name: &str) -> Result<PathBuf, AmmError> {
        if !is_plain_file_name(name) {
            return Err(AmmError::precondition(format!(
                "workflow name must be a plain file name: {}",
                name
            )));
        }
        let dir = self.workflow_dir.as_ref().ok_or_else(|| {
            AmmError::not_found(format!("workflow directory of bundle {}", self.id))
        })?;
        Ok(dir.join(name))
    }
}

pub trait BundleLoader: Send + Sync {
    /// Load a bundle, or `NotFound`.
    fn load_bundle(&self, bundle_id: &str) -> Result<BundleDefinition, AmmError>;
}

/// Loads bundles from JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonBundleLoader {
    dir: PathBuf,
}

impl JsonBundleLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids of every `*.json` bundle in the directory, sorted.
    pub fn list_bundle_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl BundleLoader for JsonBundleLoader {
    fn load_bundle(&self, bundle_id: &str) -> Result<BundleDefinition, AmmError> {
        if !is_plain_file_name(bundle_id) {
            return Err(AmmError::not_found(format!("bundle {}", bundle_id)));
        }
        let path = self.dir.join(format!("{}.json", bundle_id));
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AmmError::not_found(format!("bundle {}", bundle_id)));
            }
            Err(e) => {
                return Err(AmmError::not_found(format!(
                    "bundle {}: cannot read {}: {}",
                    bundle_id,
                    path.display(),
                    e
                )))
            }
        };
        let mut bundle: BundleDefinition = serde_json::from_str(&data).map_err(|e| {
            AmmError::not_found(format!(
                "bundle {}: invalid definition {}: {}",
                bundle_id,
                path.display(),
                e
            ))
        })?;
        bundle.workflow_dir = Some(self.dir.join(bundle_id).join("workflows"));
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDXL: &str = r#"{
        "id": "sdxl",
        "name": "SDXL base",
        "profiles": {
            "nvidia": {
                "models": [
                    {"id": "base", "url": "https://huggingface.co/s/resolve/main/base.safetensors",
                     "destination": "checkpoints/base.safetensors", "size": 6938078334},
                    {"id": "nodes", "git": "https://github.com/org/nodes.git", "ref": "v2",
                     "destination": "custom_nodes/nodes"}
                ],
                "workflows": ["sdxl.json"]
            },
            "cpu": {}
        }
    }"#;

    #[test]
    fn loads_json_bundle_and_sets_workflow_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sdxl.json"), SDXL).unwrap();
        let loader = JsonBundleLoader::new(dir.path());
        let bundle = loader.load_bundle("sdxl").unwrap();
        assert_eq!(bundle.name.as_deref(), Some("SDXL base"));
        let nvidia = bundle.profile("nvidia").unwrap();
        assert_eq!(nvidia.models.len(), 2);
        assert_eq!(nvidia.workflows, vec!["sdxl.json".to_string()]);
        assert!(bundle.profile("cpu").unwrap().models.is_empty());
        assert_eq!(
            bundle.workflow_source("sdxl.json").unwrap(),
            dir.path().join("sdxl/workflows/sdxl.json")
        );
        assert_eq!(loader.list_bundle_ids().unwrap(), vec!["sdxl".to_string()]);
    }

    #[test]
    fn missing_bundle_and_profile_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sdxl.json"), SDXL).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        let loader = JsonBundleLoader::new(dir.path());
        assert_eq!(loader.load_bundle("flux").unwrap_err().kind(), "not_found");
        assert_eq!(loader.load_bundle("broken").unwrap_err().kind(), "not_found");
        assert_eq!(loader.load_bundle("../sdxl").unwrap_err().kind(), "not_found");
        let bundle = loader.load_bundle("sdxl").unwrap();
        assert_eq!(bundle.profile("amd").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn model_definitions_map_to_requests() {
        let bundle: BundleDefinition = serde_json::from_str(SDXL).unwrap();
        let models = &bundle.profile("nvidia").unwrap().models;

        let http = models[0].to_request().unwrap();
        assert_eq!(http.expected_size(), Some(6_938_078_334));
        assert_eq!(http.destination.as_deref(), Some("checkpoints/base.safetensors"));

        let git = models[1].to_request().unwrap();
        assert_eq!(
            git.source,
            AssetSource::git("https://github.com/org/nodes.git", Some("v2".to_string()))
        );

        let neither = ModelDefinition {
            url: None,
            git: None,
            ..models[0].clone()
        };
        assert_eq!(neither.to_request().unwrap_err().kind(), "precondition_failed");
    }

    #[test]
    fn workflow_names_must_be_plain() {
        let mut bundle: BundleDefinition = serde_json::from_str(SDXL).unwrap();
        bundle.workflow_dir = Some(PathBuf::from("/b/sdxl/workflows"));
        assert!(bundle.workflow_source("../../etc/passwd").is_err());
        assert_eq!(
            bundle.workflow_source("a.json").unwrap(),
            PathBuf::from("/b/sdxl/workflows/a.json")
        );
    }
}
