//! Shared identifier and status types for hdpatcher
//!
//! Module and operation ids are newtypes over `String` so they can't be mixed
//! up with each other or with display names. Closed sets of values (providers,
//! record status, verify outcome) are strum-backed enums that parse from and
//! print to the lowercase strings used in catalog files and on the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique short code of a patch module (e.g. `"A"`, `"L"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the module's archive uses in both the downloads folder and
    /// the installation's `Data` folder.
    pub fn archive_file_name(&self) -> String {
        format!("Patch-{}.mpq", self.0.to_uppercase())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Key under which a download's or an install's progress events are tracked.
///
/// Downloads get a freshly minted id per unit; installs reuse the module id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Mint a new unique operation id.
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&ModuleId> for OperationId {
    fn from(id: &ModuleId) -> Self {
        Self(id.0.clone())
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Hosting provider of a download link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    Mediafire,
    #[serde(alias = "google_drive", alias = "gdrive")]
    #[strum(serialize = "googledrive", serialize = "gdrive")]
    GoogleDrive,
    Dropbox,
    Mega,
    /// Plain URL or path that needs no provider-specific resolution
    #[default]
    Direct,
    #[serde(other)]
    Unknown,
}

/// Lifecycle status of a progress record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// Returns true if this is a terminal status (Completed or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Outcome of verifying one installed module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerifyStatus {
    /// Installed and matches the reference archive
    Ok,
    /// Installed but differs in size from the reference archive
    SizeMismatch,
    /// Not present in the installation
    Missing,
    /// Installed, but no reference archive exists to compare against
    NoReference,
}

impl VerifyStatus {
    /// Returns true if a repair would change anything for this outcome.
    ///
    /// `NoReference` can't be repaired: the reference archive is exactly
    /// what is missing.
    pub const fn needs_repair(self) -> bool {
        matches!(self, Self::SizeMismatch | Self::Missing)
    }
}
