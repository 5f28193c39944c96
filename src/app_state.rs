//! Application State Machine
//!
//! The authoritative record of which phase an apply run is in. It decides
//! which orchestrators may run and whether the apply trigger is enabled.
//!
//! # Design Principles
//!
//! - **Single Source of Truth**: `AppStateMachine` owns the current stage
//! - **Validated Transitions**: only the edges below are allowed
//! - **Failures Stick**: a failing phase records per-module failures and stays
//!   where it is; it never jumps to `Complete` on its own
//!
//! # Stage Flow
//!
//! ```text
//! Configure
//!     ├──→ Uninstalling ──→ Downloading ──→ Installing ──→ Complete
//!     │         └─────────────────┴────────────────────────→ Complete
//!     └──→ Downloading
//!
//! Complete ──→ Configure   (the only way back)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::types::ModuleId;

/// Top-level application stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppStage {
    /// Editing the selection; nothing is running
    #[default]
    Configure,
    /// Removing modules no longer selected
    Uninstalling,
    /// Fetching archives for newly selected modules
    Downloading,
    /// Copying downloaded archives into the installation
    Installing,
    /// Apply finished; the trigger now only resets
    Complete,
}

impl AppStage {
    /// Returns true while an orchestrator is (or was left) running
    #[inline]
    pub const fn is_phase(self) -> bool {
        matches!(self, Self::Uninstalling | Self::Downloading | Self::Installing)
    }

    /// Stages reachable from this one
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Configure => &[Self::Uninstalling, Self::Downloading],
            Self::Uninstalling => &[Self::Downloading, Self::Complete],
            Self::Downloading => &[Self::Installing, Self::Complete],
            Self::Installing => &[Self::Complete],
            Self::Complete => &[Self::Configure],
        }
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        self.successors().contains(&target)
    }

    /// Returns a human-readable description of this stage
    pub const fn description(self) -> &'static str {
        match self {
            Self::Configure => "Configuring selection",
            Self::Uninstalling => "Removing patches",
            Self::Downloading => "Downloading patches",
            Self::Installing => "Installing patches",
            Self::Complete => "Apply complete",
        }
    }

    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Configure,
            Self::Uninstalling,
            Self::Downloading,
            Self::Installing,
            Self::Complete,
        ]
    }
}

impl fmt::Display for AppStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppTransitionError {
    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: AppStage, to: AppStage },

    #[error("Already at stage '{stage}'")]
    AlreadyAtStage { stage: AppStage },
}

/// Owner of the current application stage.
///
/// # Example
///
/// ```
/// use hdpatcher::app_state::{AppStateMachine, AppStage};
///
/// let mut sm = AppStateMachine::new();
/// sm.transition_to(AppStage::Downloading).unwrap();
/// assert!(sm.transition_to(AppStage::Configure).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppStateMachine {
    current: AppStage,
    /// Stages entered, with unix timestamps
    history: Vec<(AppStage, u64)>,
    /// Per-module failures of the current or last run
    failures: BTreeMap<ModuleId, String>,
}

impl AppStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> AppStage {
        self.current
    }

    pub fn history(&self) -> &[(AppStage, u64)] {
        &self.history
    }

    /// Move to `target` if the edge exists.
    pub fn transition_to(&mut self, target: AppStage) -> Result<AppStage, AppTransitionError> {
        if target == self.current {
            return Err(AppTransitionError::AlreadyAtStage { stage: target });
        }
        if !self.current.can_transition_to(target) {
            return Err(AppTransitionError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }
        tracing::debug!(from = %self.current, to = %target, "Stage transition");
        self.record(target);
        self.current = target;
        Ok(target)
    }

    /// Whether the apply trigger is enabled.
    ///
    /// In `Configure` it needs a known installation path and pending changes;
    /// in `Complete` it is always enabled and only resets.
    pub fn can_trigger(&self, has_path: bool, has_changes: bool) -> bool {
        match self.current {
            AppStage::Configure => has_path && has_changes,
            AppStage::Complete => true,
            _ => false,
        }
    }

    pub fn record_failure(&mut self, module: ModuleId, reason: impl Into<String>) {
        self.failures.insert(module, reason.into());
    }

    pub fn failures(&self) -> &BTreeMap<ModuleId, String> {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Leave a phase that stopped on failures by moving to `Complete`.
    /// No-op outside a phase.
    pub fn conclude(&mut self) -> Result<(), AppTransitionError> {
        if self.current.is_phase() {
            self.transition_to(AppStage::Complete)?;
        }
        Ok(())
    }

    /// Return to `Configure` from wherever the machine stopped.
    ///
    /// Failures stay recorded until the next run clears them.
    pub fn return_to_configure(&mut self) -> Result<(), AppTransitionError> {
        self.conclude()?;
        if self.current == AppStage::Complete {
            self.transition_to(AppStage::Configure)?;
        }
        Ok(())
    }

    /// Clear stage, history and failures.
    pub fn reset(&mut self) {
        self.current = AppStage::Configure;
        self.history.clear();
        self.failures.clear();
    }

    fn record(&mut self, stage: AppStage) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.history.push((stage, timestamp));
    }
}

impl From<AppTransitionError> for crate::error::PatcherError {
    fn from(err: AppTransitionError) -> Self {
        crate::error::PatcherError::Transition(err.to_string())
    }
}
