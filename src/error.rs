//! Error handling module for hdpatcher
//!
//! Provides a single crate-wide error type built with thiserror. Resolver,
//! orchestration and collaborator failures all funnel through `PatcherError`
//! so per-module failures can be stored next to the progress record they
//! belong to.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{ModuleId, VerifyStatus};

/// Main error type for hdpatcher
#[derive(Error, Debug)]
pub enum PatcherError {
    /// A module was selected without all of its dependencies
    #[error("Module {module} is missing dependencies: {}", join_ids(.missing))]
    DependencyUnsatisfied {
        module: ModuleId,
        missing: Vec<ModuleId>,
    },

    /// A module was selected together with a module it conflicts with
    #[error("Module {module} conflicts with: {}", join_ids(.conflicting))]
    ConflictDetected {
        module: ModuleId,
        conflicting: Vec<ModuleId>,
    },

    /// The module has no download link for the chosen variant
    #[error("No download link for module {module} at index {index}")]
    NoDownloadLink { module: ModuleId, index: usize },

    /// The catalog could not be fetched at all
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The catalog was fetched but is internally inconsistent
    #[error("Catalog defect: {0}")]
    CatalogDefect(String),

    /// A transfer unit failed
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Installing (or uninstalling) a module failed
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Verification found an installed archive in a bad state
    #[error("Verification mismatch: {0}")]
    VerifyMismatch(VerifyStatus),

    /// A collaborator broke the event protocol
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// No installation folder has been chosen or detected
    #[error("Installation folder is not known")]
    InstallPathUnknown,

    /// The folder does not look like a game installation
    #[error("Not a valid game installation: {}", .0.display())]
    InvalidInstallation(PathBuf),

    /// Variant index out of range for the module
    #[error("Module {module} has no variant at index {index}")]
    InvalidVariant { module: ModuleId, index: usize },

    /// Module id not present in the catalog
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    /// Another apply/verify/repair run holds the installation
    #[error("Another operation is already running on this installation")]
    OperationInProgress,

    /// Application state machine misuse
    #[error("State transition error: {0}")]
    Transition(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for hdpatcher operations
pub type Result<T> = std::result::Result<T, PatcherError>;

fn join_ids(ids: &[ModuleId]) -> String {
    ids.iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// Convenient error constructors
impl PatcherError {
    /// Create a transfer failure
    pub fn transfer(reason: impl Into<String>) -> Self {
        Self::TransferFailed(reason.into())
    }

    /// Create an install failure
    pub fn install(reason: impl Into<String>) -> Self {
        Self::InstallFailed(reason.into())
    }

    /// Create a protocol violation
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation(reason.into())
    }

    /// Create a catalog defect
    pub fn catalog_defect(reason: impl Into<String>) -> Self {
        Self::CatalogDefect(reason.into())
    }

    /// Create a catalog-unavailable error
    pub fn catalog_unavailable(reason: impl Into<String>) -> Self {
        Self::CatalogUnavailable(reason.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true for errors that only affect a single module and leave
    /// sibling units untouched.
    pub fn is_per_module(&self) -> bool {
        matches!(
            self,
            Self::NoDownloadLink { .. }
                | Self::TransferFailed(_)
                | Self::InstallFailed(_)
                | Self::VerifyMismatch(_)
                | Self::ProtocolViolation(_)
        )
    }
}
