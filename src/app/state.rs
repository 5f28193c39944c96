//! Value types the `Patcher` hands back to its callers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ModuleId;

/// Settings the controller needs from configuration
#[derive(Debug, Clone)]
pub struct PatcherOptions {
    /// Where download units put archives
    pub downloads_dir: PathBuf,
    /// Upper bound for each download unit
    pub transfer_timeout: Option<Duration>,
}

impl PatcherOptions {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            transfer_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }
}

/// Summary of one apply trigger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Modules that were uninstalled
    pub removed: Vec<ModuleId>,
    /// Modules that were downloaded and installed
    pub installed: Vec<ModuleId>,
    /// Module -> reason, for every id that failed in any phase
    pub failed: BTreeMap<ModuleId, String>,
    /// The run reached `Complete`
    pub completed: bool,
    /// The trigger only returned the machine to `Configure`
    pub reset_only: bool,
}

impl ApplyReport {
    pub(crate) fn reset() -> Self {
        Self {
            reset_only: true,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
