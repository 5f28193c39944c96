//! Install Orchestrator
//!
//! Hands a batch of module ids to the install service and tracks its single,
//! module-multiplexed event stream on the board. Install records are keyed by
//! module id.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::sync::mpsc;

use crate::error::PatcherError;
use crate::progress::{ProgressBoard, ProgressEvent};
use crate::services::InstallService;
use crate::types::{ModuleId, OperationId, ProgressStatus};

/// Per-module outcome of an install batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<ModuleId>,
    /// Failed module -> reason
    pub failed: BTreeMap<ModuleId, String>,
}

impl InstallReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Install `ids` in one batch.
///
/// An id counts as installed when the service returns it and its record did
/// not fail. An id missing from the returned list is a failure: its own
/// `failed` reason if it sent one, a protocol violation otherwise, even when
/// its record already says `Completed`. If the whole batch errors, every id
/// without a `Completed` record fails with that error.
pub async fn install_patches(
    service: &dyn InstallService,
    game_dir: &Path,
    ids: &[ModuleId],
    board: &mut ProgressBoard,
) -> InstallReport {
    board.begin_run(ids.iter().map(OperationId::from));
    if ids.is_empty() {
        return InstallReport::default();
    }
    tracing::info!(modules = ids.len(), "Starting install batch");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut batch = std::pin::pin!(service.install(game_dir, ids, tx));

    let result = loop {
        tokio::select! {
            biased;
            Some(event) = rx.recv() => {
                board.apply(&event);
            }
            result = &mut batch => break result,
        }
    };
    while let Ok(event) = rx.try_recv() {
        board.apply(&event);
    }

    let mut report = InstallReport::default();
    match result {
        Ok(returned) => {
            let returned: BTreeSet<ModuleId> = returned.into_iter().collect();
            for id in ids {
                let op = OperationId::from(id);
                if returned.contains(id) {
                    board.apply(&ProgressEvent::Completed { id: op.clone() });
                    collect(board, id, &mut report);
                    continue;
                }
                // Left out of the result: failed, even if its record completed
                let own_failure = board
                    .get(&op)
                    .filter(|rec| rec.status == ProgressStatus::Failed)
                    .and_then(|rec| rec.error.clone());
                let reason = match own_failure {
                    Some(reason) => reason,
                    None => {
                        tracing::warn!(module = %id, "Install result omitted module");
                        let reason = PatcherError::protocol(format!(
                            "install finished without reporting module {}",
                            id
                        ))
                        .to_string();
                        board.fail_if_open(&op, &reason);
                        reason
                    }
                };
                report.failed.insert(id.clone(), reason);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Install batch failed");
            let reason = e.to_string();
            for id in ids {
                board.fail_if_open(&OperationId::from(id), &reason);
                collect(board, id, &mut report);
            }
        }
    }

    tracing::info!(
        installed = report.installed.len(),
        failed = report.failed.len(),
        "Install batch settled"
    );
    report
}

fn collect(board: &ProgressBoard, id: &ModuleId, report: &mut InstallReport) {
    match board.get(&OperationId::from(id)) {
        Some(rec) if rec.status == ProgressStatus::Completed => report.installed.push(id.clone()),
        Some(rec) => {
            let reason = rec.error.clone().unwrap_or_else(|| "unknown".to_string());
            report.failed.insert(id.clone(), reason);
        }
        None => {
            report.failed.insert(id.clone(), "unknown".to_string());
        }
    }
}
