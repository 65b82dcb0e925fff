use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration loaded from `~/.config/amm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmmConfig {
    /// Root for models, workflows and bundle definitions. None = `~/.local/share/amm`.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    /// Override for the models directory (default `<root>/models`).
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Override for the workflows directory (default `<root>/workflows`).
    #[serde(default)]
    pub workflows_dir: Option<PathBuf>,
    /// Override for the bundle definitions directory (default `<root>/bundles`).
    #[serde(default)]
    pub bundles_dir: Option<PathBuf>,
    /// Receive buffer size for HTTP transfers; cancellation is checked per chunk.
    pub chunk_size_bytes: usize,
    /// How often a running git process is polled for exit and cancellation.
    pub git_poll_interval_ms: u64,
    /// Git executable used for clone/checkout.
    pub git_binary: String,
    /// Connect timeout for HTTP transfers. There is no overall transfer timeout.
    pub connect_timeout_secs: u64,
    /// Provider name ("huggingface", "civitai") to API token.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Default for AmmConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            models_dir: None,
            workflows_dir: None,
            bundles_dir: None,
            chunk_size_bytes: 64 * 1024,
            git_poll_interval_ms: 250,
            git_binary: "git".to_string(),
            connect_timeout_secs: 30,
            tokens: HashMap::new(),
        }
    }
}

/// Runtime knobs handed to transfer executors.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub chunk_size_bytes: usize,
    pub git_poll_interval: Duration,
    pub git_binary: String,
    pub connect_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        AmmConfig::default().transfer_settings()
    }
}

impl AmmConfig {
    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            chunk_size_bytes: self.chunk_size_bytes.max(1024),
            git_poll_interval: Duration::from_millis(self.git_poll_interval_ms.max(10)),
            git_binary: self.git_binary.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
        }
    }

    /// Storage root: configured value, else the XDG data dir.
    pub fn storage_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.storage_root {
            return Ok(root.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("amm")?;
        Ok(xdg_dirs.get_data_home().join("amm"))
    }

    pub fn models_dir(&self) -> Result<PathBuf> {
        self.dir_or_default(self.models_dir.as_deref(), "models")
    }

    pub fn workflows_dir(&self) -> Result<PathBuf> {
        self.dir_or_default(self.workflows_dir.as_deref(), "workflows")
    }

    pub fn bundles_dir(&self) -> Result<PathBuf> {
        self.dir_or_default(self.bundles_dir.as_deref(), "bundles")
    }

    fn dir_or_default(&self, configured: Option<&Path>, name: &str) -> Result<PathBuf> {
        match configured {
            Some(dir) => Ok(dir.to_path_buf()),
            None => Ok(self.storage_root()?.join(name)),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("amm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AmmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AmmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<AmmConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AmmConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
