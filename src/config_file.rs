//! Configuration file handling for hdpatcher.
//!
//! The configuration says where the catalog lives, where archives are
//! downloaded to, and how transfers and installs behave. Every field has a
//! default, so a missing or partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory name under the platform data/config dirs
pub const APP_DIR: &str = "hdpatcher";

/// Patcher configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    /// Module catalog JSON
    pub catalog_path: PathBuf,
    /// Where downloaded archives are stored
    pub downloads_dir: PathBuf,
    /// Base directory relative link URLs resolve against
    pub mirror_root: Option<PathBuf>,
    /// Persisted settings (installation folder, last selection)
    pub settings_path: PathBuf,
    /// Upper bound for a single transfer, in seconds
    pub transfer_timeout_secs: Option<u64>,
    /// Minimum time between progress events from one source
    pub progress_interval_ms: u64,
    /// Reset the game's WDB cache before install/repair
    pub clear_cache_on_install: bool,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            catalog_path: config.join("catalog.json"),
            downloads_dir: data.join("downloads"),
            mirror_root: None,
            settings_path: config.join("settings.json"),
            transfer_timeout_secs: None,
            progress_interval_ms: 100,
            clear_cache_on_install: true,
        }
    }
}

impl PatcherConfig {
    /// Default location of the configuration file itself
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::load_from_file(&default)
                } else {
                    tracing::debug!("No configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.catalog_path.as_os_str().is_empty() {
            anyhow::bail!("Catalog path must be specified");
        }
        if self.downloads_dir.as_os_str().is_empty() {
            anyhow::bail!("Downloads directory must be specified");
        }
        if self.settings_path.as_os_str().is_empty() {
            anyhow::bail!("Settings path must be specified");
        }
        if self.transfer_timeout_secs == Some(0) {
            anyhow::bail!("Transfer timeout must be at least one second");
        }
        if self.progress_interval_ms > 10_000 {
            anyhow::bail!("Progress interval must be at most 10000 ms");
        }
        if let Some(root) = &self.mirror_root {
            if !root.is_dir() {
                anyhow::bail!("Mirror root {:?} is not a directory", root);
            }
        }
        Ok(())
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_secs.map(Duration::from_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
