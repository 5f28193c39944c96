//! Collaborator interfaces consumed by the orchestrators.
//!
//! Everything that touches the network, the disk or the user sits behind one
//! of these traits. The orchestrators only see trait objects, so tests drive
//! them with in-memory fakes and the binary plugs in the `local` services.
//!
//! # Event Protocol
//!
//! Transfer and install services report progress through an `EventSink`.
//! Per id the expected order is `Started`, any number of `Progress`, then
//! exactly one of `Completed` / `Failed`. Sending never blocks; a send after
//! the run has finished is silently dropped.
//!
//! A `DownloadService` only sends `Started` and `Progress`: the download
//! orchestrator emits the terminal event itself from the transfer's result.
//! An `InstallService` sends terminal events per module; whatever it leaves
//! open is reconciled against the ids it returns.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::logic::resolver::Selection;
use crate::progress::ProgressEvent;
use crate::types::{ModuleId, OperationId, Provider, VerifyStatus};

/// Sending half of a run's event channel
pub type EventSink = mpsc::UnboundedSender<ProgressEvent>;

/// Send an event, ignoring a closed channel.
pub fn emit(sink: &EventSink, event: ProgressEvent) {
    if sink.send(event).is_err() {
        tracing::trace!("Event dropped: run already finished");
    }
}

/// One archive transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Id every event for this transfer must carry
    pub id: OperationId,
    pub module: ModuleId,
    pub url: String,
    pub provider: Provider,
    pub dest_dir: PathBuf,
    pub target_file_name: Option<String>,
    pub display_name: String,
}

// ============================================================================
// Async Services
// ============================================================================

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Catalog>;
}

#[async_trait]
pub trait InstallProbe: Send + Sync {
    /// Which of `ids` are currently present in the installation.
    async fn detect_installed(&self, game_dir: &Path, ids: &[ModuleId]) -> Result<Selection>;
}

#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Transfer one archive, reporting progress under `request.id`.
    /// Returns the path of the downloaded file.
    async fn transfer(&self, request: TransferRequest, sink: EventSink) -> Result<PathBuf>;
}

#[async_trait]
pub trait InstallService: Send + Sync {
    /// Install `ids`, reporting progress keyed by module id. Returns the ids
    /// that were installed.
    async fn install(&self, game_dir: &Path, ids: &[ModuleId], sink: EventSink)
    -> Result<Vec<ModuleId>>;
}

#[async_trait]
pub trait UninstallService: Send + Sync {
    /// Remove `ids`. Returns the ids that were removed.
    async fn uninstall(&self, game_dir: &Path, ids: &[ModuleId]) -> Result<Vec<ModuleId>>;
}

#[async_trait]
pub trait VerifyService: Send + Sync {
    /// Read-only integrity check.
    async fn verify(
        &self,
        game_dir: &Path,
        ids: &[ModuleId],
    ) -> Result<BTreeMap<ModuleId, VerifyStatus>>;
}

// ============================================================================
// Installation Locator
// ============================================================================

/// Finds and remembers the game installation folder.
pub trait InstallationLocator: Send + Sync {
    /// Ask the user for a folder. `None` means they declined.
    fn select_folder(&self) -> Option<PathBuf>;

    /// Look for an installation in well-known places.
    fn probe_known(&self) -> Option<PathBuf>;

    fn load_persisted(&self) -> Option<PathBuf>;

    fn persist(&self, path: &Path) -> Result<()>;

    /// Returns true if `path` looks like a game installation.
    fn is_valid(&self, path: &Path) -> bool;
}

/// Every collaborator the `Patcher` needs
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogSource>,
    pub probe: Arc<dyn InstallProbe>,
    pub download: Arc<dyn DownloadService>,
    pub install: Arc<dyn InstallService>,
    pub uninstall: Arc<dyn UninstallService>,
    pub verify: Arc<dyn VerifyService>,
    pub locator: Arc<dyn InstallationLocator>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
