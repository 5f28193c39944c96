//! Download Orchestrator
//!
//! Runs one transfer per module, all at once, and waits for every one of them
//! to settle. A failing unit never cancels its siblings.
//!
//! # Design
//!
//! - **Settle-all**: units are joined with `join_all`; each yields its own
//!   `Result`
//! - **One channel per run**: units share an unbounded sender; the control
//!   loop drains the receiver into the `ProgressBoard` while units run
//! - **Every unit terminates**: a unit emits its own `Completed`/`Failed`
//!   event from its result, and anything still open after the join is sealed

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::catalog::{Catalog, DownloadLink, Module};
use crate::error::{PatcherError, Result};
use crate::progress::{ProgressBoard, ProgressEvent};
use crate::services::{emit, DownloadService, EventSink, TransferRequest};
use crate::types::{ModuleId, OperationId};

/// Settings shared by every unit of a run
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub dest_dir: PathBuf,
    /// Upper bound for a single transfer
    pub timeout: Option<Duration>,
}

/// Result of one download unit
#[derive(Debug)]
pub struct DownloadOutcome {
    pub module: ModuleId,
    pub operation: OperationId,
    pub result: Result<PathBuf>,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Modules whose download succeeded, in outcome order.
pub fn succeeded(outcomes: &[DownloadOutcome]) -> Vec<ModuleId> {
    outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.module.clone())
        .collect()
}

/// Pick the link to download for `module`.
///
/// Modules with more than one variant use the link at the chosen variant
/// index; everything else uses the first link.
pub fn select_link(module: &Module, variant: usize) -> Result<&DownloadLink> {
    let index = if module.has_variants() { variant } else { 0 };
    module.links.get(index).ok_or_else(|| PatcherError::NoDownloadLink {
        module: module.id.clone(),
        index,
    })
}

/// Download every module in `ids` concurrently.
///
/// The board is reset to this run's operation ids before any unit starts.
/// Returns one outcome per requested module, in request order.
pub async fn download_all(
    service: &dyn DownloadService,
    catalog: &Catalog,
    ids: &[ModuleId],
    variants: &BTreeMap<ModuleId, usize>,
    options: &DownloadOptions,
    board: &mut ProgressBoard,
) -> Vec<DownloadOutcome> {
    let units: Vec<(ModuleId, OperationId)> = ids
        .iter()
        .map(|id| (id.clone(), OperationId::mint()))
        .collect();
    board.begin_run(units.iter().map(|(_, op)| op.clone()));

    if units.is_empty() {
        return Vec::new();
    }
    tracing::info!(units = units.len(), "Starting downloads");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pending = units.iter().map(|(module, operation)| {
        let variant = variants.get(module).copied().unwrap_or(0);
        run_unit(
            service,
            catalog,
            module.clone(),
            operation.clone(),
            variant,
            options,
            tx.clone(),
        )
    });
    let mut settle = std::pin::pin!(join_all(pending));
    drop(tx);

    let outcomes = loop {
        tokio::select! {
            biased;
            Some(event) = rx.recv() => {
                board.apply(&event);
            }
            outcomes = &mut settle => break outcomes,
        }
    };
    while let Ok(event) = rx.try_recv() {
        board.apply(&event);
    }
    board.seal_unfinished("download ended without a terminal event");

    let ok = outcomes.iter().filter(|o| o.is_success()).count();
    tracing::info!(
        succeeded = ok,
        failed = outcomes.len() - ok,
        "Downloads settled"
    );
    outcomes
}

async fn run_unit(
    service: &dyn DownloadService,
    catalog: &Catalog,
    module_id: ModuleId,
    operation: OperationId,
    variant: usize,
    options: &DownloadOptions,
    sink: EventSink,
) -> DownloadOutcome {
    let result = transfer_unit(service, catalog, &module_id, &operation, variant, options, &sink).await;

    match &result {
        Ok(path) => {
            tracing::debug!(module = %module_id, path = %path.display(), "Download finished");
            emit(&sink, ProgressEvent::Completed { id: operation.clone() });
        }
        Err(e) => {
            tracing::warn!(module = %module_id, error = %e, "Download failed");
            emit(&sink, ProgressEvent::failed(operation.clone(), e));
        }
    }

    DownloadOutcome {
        module: module_id,
        operation,
        result,
    }
}

async fn transfer_unit(
    service: &dyn DownloadService,
    catalog: &Catalog,
    module_id: &ModuleId,
    operation: &OperationId,
    variant: usize,
    options: &DownloadOptions,
    sink: &EventSink,
) -> Result<PathBuf> {
    let module = catalog.require(module_id)?;
    let link = select_link(module, variant)?;

    let request = TransferRequest {
        id: operation.clone(),
        module: module_id.clone(),
        url: link.url.clone(),
        provider: link.provider,
        dest_dir: options.dest_dir.clone(),
        target_file_name: Some(module.archive_file_name()),
        display_name: module.name.clone(),
    };

    let transfer = service.transfer(request, sink.clone());
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .unwrap_or_else(|_| {
                Err(PatcherError::transfer(format!(
                    "timed out after {}s",
                    limit.as_secs()
                )))
            }),
        None => transfer.await,
    }
}
