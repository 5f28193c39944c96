//! Persisted user settings and the filesystem installation locator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::local::detector;
use crate::services::InstallationLocator;
use crate::types::ModuleId;

/// Values remembered between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub install_path: Option<PathBuf>,
    pub selected_modules: Vec<ModuleId>,
}

/// JSON file holding `Settings`
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings. A missing or unreadable file yields defaults.
    pub fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring malformed settings");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    }

    /// Load, change, save.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)
    }
}

/// Locator backed by the settings file and folder auto-detection.
///
/// A command-line frontend can't open a folder picker, so the "user's
/// choice" is whatever folder was passed on the command line.
#[derive(Debug, Clone)]
pub struct FsLocator {
    store: SettingsStore,
    chosen: Option<PathBuf>,
}

impl FsLocator {
    pub fn new(store: SettingsStore) -> Self {
        Self {
            store,
            chosen: None,
        }
    }

    pub fn with_choice(mut self, path: Option<PathBuf>) -> Self {
        self.chosen = path;
        self
    }
}

impl InstallationLocator for FsLocator {
    fn select_folder(&self) -> Option<PathBuf> {
        self.chosen.clone()
    }

    fn probe_known(&self) -> Option<PathBuf> {
        detector::auto_detect()
    }

    fn load_persisted(&self) -> Option<PathBuf> {
        self.store.load().install_path
    }

    fn persist(&self, path: &Path) -> Result<()> {
        self.store
            .update(|s| s.install_path = Some(path.to_path_buf()))
    }

    fn is_valid(&self, path: &Path) -> bool {
        detector::is_valid_installation(path)
    }
}
