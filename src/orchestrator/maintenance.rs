//! Verify/Repair Coordinator
//!
//! Verify is read-only. Repair re-installs modules through the regular
//! install event protocol. Both take the operation gate, so neither can run
//! while another verify, repair or apply holds the installation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{PatcherError, Result};
use crate::orchestrator::install::install_patches;
use crate::progress::ProgressBoard;
use crate::services::{InstallService, VerifyService};
use crate::types::{ModuleId, VerifyStatus};

// ============================================================================
// Operation Gate
// ============================================================================

/// Exclusive access to an installation for apply, verify and repair.
///
/// Cloning shares the same gate.
#[derive(Debug, Clone, Default)]
pub struct OperationGate(Arc<Mutex<()>>);

/// Held for the duration of one gated operation
pub type GateGuard = OwnedMutexGuard<()>;

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate without waiting. Fails with `OperationInProgress` if it
    /// is already held.
    pub fn try_acquire(&self) -> Result<GateGuard> {
        Arc::clone(&self.0).try_lock_owned().map_err(|_| {
            tracing::warn!("Operation rejected: installation is busy");
            PatcherError::OperationInProgress
        })
    }

    pub fn is_busy(&self) -> bool {
        self.0.try_lock().is_err()
    }
}

// ============================================================================
// Verify & Repair
// ============================================================================

/// Outcome of repairing one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub module: ModuleId,
    pub success: bool,
    pub error: Option<String>,
}

/// Check `ids` against their reference archives.
pub async fn verify(
    gate: &OperationGate,
    service: &dyn VerifyService,
    game_dir: &Path,
    ids: &[ModuleId],
) -> Result<BTreeMap<ModuleId, VerifyStatus>> {
    let _guard = gate.try_acquire()?;
    tracing::info!(modules = ids.len(), "Verifying installation");
    let results = service.verify(game_dir, ids).await?;
    let bad = results.values().filter(|s| s.needs_repair()).count();
    tracing::info!(checked = results.len(), needing_repair = bad, "Verify finished");
    Ok(results)
}

/// Modules whose verify outcome calls for a repair.
pub fn needing_repair(results: &BTreeMap<ModuleId, VerifyStatus>) -> Vec<ModuleId> {
    results
        .iter()
        .filter(|(_, status)| status.needs_repair())
        .map(|(id, _)| id.clone())
        .collect()
}

/// Re-install `ids`, tracking progress on `board`.
pub async fn repair(
    gate: &OperationGate,
    service: &dyn InstallService,
    game_dir: &Path,
    ids: &[ModuleId],
    board: &mut ProgressBoard,
) -> Result<Vec<RepairOutcome>> {
    let _guard = gate.try_acquire()?;
    tracing::info!(modules = ids.len(), "Repairing modules");
    let report = install_patches(service, game_dir, ids, board).await;

    Ok(ids
        .iter()
        .map(|id| match report.failed.get(id) {
            Some(reason) => RepairOutcome {
                module: id.clone(),
                success: false,
                error: Some(reason.clone()),
            },
            None => RepairOutcome {
                module: id.clone(),
                success: true,
                error: None,
            },
        })
        .collect())
}
