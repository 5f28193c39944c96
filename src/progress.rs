//! Progress aggregation shared by downloads and installs.
//!
//! Collaborators report `ProgressEvent`s keyed by an operation id. A pure
//! reducer folds each event into the record for that id, and `ProgressBoard`
//! holds the records of one orchestration run.
//!
//! # Design
//!
//! - **Pure reducer**: `reduce(record, event) -> record`, no I/O
//! - **Monotonic**: percent and completed units never go backwards, so
//!   out-of-order progress events are harmless
//! - **Terminal is final**: once completed or failed, later events are ignored
//! - **Run-scoped**: a board is reset at the start of every run and only
//!   accepts events for the ids that run expects

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::PatcherError;
use crate::types::{OperationId, ProgressStatus};

// ============================================================================
// Events & Records
// ============================================================================

/// Event emitted by a download or install for one operation id
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        id: OperationId,
        display_name: String,
        total_units: u64,
    },
    Progress {
        id: OperationId,
        done_units: u64,
        total_units: u64,
        /// Units per second, when the source measures it
        rate: Option<u64>,
        percent: f32,
    },
    Completed {
        id: OperationId,
    },
    Failed {
        id: OperationId,
        reason: String,
    },
}

impl ProgressEvent {
    pub fn id(&self) -> &OperationId {
        match self {
            Self::Started { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id }
            | Self::Failed { id, .. } => id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn failed(id: OperationId, err: &PatcherError) -> Self {
        Self::Failed {
            id,
            reason: err.to_string(),
        }
    }
}

/// Aggregated state of one tracked operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub id: OperationId,
    pub display_name: String,
    pub total_units: u64,
    pub completed_units: u64,
    pub rate: Option<u64>,
    pub percent: f32,
    pub status: ProgressStatus,
    pub error: Option<String>,
}

impl ProgressRecord {
    pub fn new(id: OperationId) -> Self {
        let display_name = id.to_string();
        Self {
            id,
            display_name,
            total_units: 0,
            completed_units: 0,
            rate: None,
            percent: 0.0,
            status: ProgressStatus::Pending,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Fold `event` into `record`, creating the record on first sight.
pub fn reduce(record: Option<ProgressRecord>, event: &ProgressEvent) -> ProgressRecord {
    let mut rec = record.unwrap_or_else(|| ProgressRecord::new(event.id().clone()));
    if rec.is_terminal() {
        return rec;
    }

    match event {
        ProgressEvent::Started {
            display_name,
            total_units,
            ..
        } => {
            rec.display_name = display_name.clone();
            if *total_units > 0 {
                rec.total_units = *total_units;
            }
            rec.status = ProgressStatus::Active;
        }
        ProgressEvent::Progress {
            done_units,
            total_units,
            rate,
            percent,
            ..
        } => {
            if *total_units > 0 {
                rec.total_units = *total_units;
            }
            rec.completed_units = rec.completed_units.max(*done_units);
            if !percent.is_nan() {
                rec.percent = rec.percent.max(percent.clamp(0.0, 100.0));
            }
            rec.rate = *rate;
            rec.status = ProgressStatus::Active;
        }
        ProgressEvent::Completed { .. } => {
            rec.percent = 100.0;
            rec.completed_units = rec.completed_units.max(rec.total_units);
            rec.rate = None;
            rec.status = ProgressStatus::Completed;
        }
        ProgressEvent::Failed { reason, .. } => {
            rec.rate = None;
            rec.error = Some(reason.clone());
            rec.status = ProgressStatus::Failed;
        }
    }
    rec
}

// ============================================================================
// Board
// ============================================================================

/// What the board did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Recorded,
    /// The record was already terminal
    IgnoredTerminal,
    /// The id isn't part of the current run
    UnknownId,
}

/// Records of one orchestration run, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    records: Vec<ProgressRecord>,
    index: HashMap<OperationId, usize>,
    expected: Option<HashSet<OperationId>>,
    violations: usize,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all records and accept events only for `ids` from now on.
    pub fn begin_run<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = OperationId>,
    {
        self.records.clear();
        self.index.clear();
        self.violations = 0;
        self.expected = Some(ids.into_iter().collect());
    }

    /// Clear all records and accept events for any id.
    pub fn reset(&mut self) {
        self.records.clear();
        self.index.clear();
        self.violations = 0;
        self.expected = None;
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> ApplyOutcome {
        let id = event.id();
        if let Some(expected) = &self.expected {
            if !expected.contains(id) {
                self.violations += 1;
                tracing::warn!(operation = %id, "Dropping event for an id outside the current run");
                return ApplyOutcome::UnknownId;
            }
        }

        match self.index.get(id) {
            Some(&idx) => {
                if self.records[idx].is_terminal() {
                    return ApplyOutcome::IgnoredTerminal;
                }
                let prev = self.records[idx].clone();
                self.records[idx] = reduce(Some(prev), event);
            }
            None => {
                self.index.insert(id.clone(), self.records.len());
                self.records.push(reduce(None, event));
            }
        }
        ApplyOutcome::Recorded
    }

    /// Fail `id` with `reason` unless it already reached a terminal status.
    /// Returns true if the record was failed by this call.
    pub fn fail_if_open(&mut self, id: &OperationId, reason: &str) -> bool {
        if self.get(id).is_some_and(ProgressRecord::is_terminal) {
            return false;
        }
        let event = ProgressEvent::Failed {
            id: id.clone(),
            reason: reason.to_string(),
        };
        self.apply(&event) == ApplyOutcome::Recorded
    }

    /// Fail every expected or seen id that hasn't reached a terminal status,
    /// so no record is left pending after a run. Returns the sealed ids.
    pub fn seal_unfinished(&mut self, reason: &str) -> Vec<OperationId> {
        let mut open: Vec<OperationId> = self
            .records
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.id.clone())
            .collect();
        if let Some(expected) = &self.expected {
            let mut unseen: Vec<OperationId> = expected
                .iter()
                .filter(|id| !self.index.contains_key(*id))
                .cloned()
                .collect();
            unseen.sort();
            open.extend(unseen);
        }

        let full_reason = PatcherError::protocol(reason).to_string();
        for id in &open {
            tracing::warn!(operation = %id, reason, "Sealing operation without a terminal event");
            self.fail_if_open(id, &full_reason);
        }
        open
    }

    pub fn get(&self, id: &OperationId) -> Option<&ProgressRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    /// Read-only copy of every record.
    pub fn snapshot(&self) -> Vec<ProgressRecord> {
        self.records.clone()
    }

    pub fn records(&self) -> &[ProgressRecord] {
        &self.records
    }

    pub fn completed(&self) -> Vec<OperationId> {
        self.with_status(ProgressStatus::Completed)
    }

    pub fn failed(&self) -> Vec<OperationId> {
        self.with_status(ProgressStatus::Failed)
    }

    fn with_status(&self, status: ProgressStatus) -> Vec<OperationId> {
        self.records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.id.clone())
            .collect()
    }

    /// True once every expected id has a terminal record.
    pub fn is_settled(&self) -> bool {
        let records_done = self.records.iter().all(ProgressRecord::is_terminal);
        match &self.expected {
            Some(expected) => {
                records_done && expected.iter().all(|id| self.index.contains_key(id))
            }
            None => records_done,
        }
    }

    /// Number of events dropped because their id wasn't part of the run.
    pub fn violations(&self) -> usize {
        self.violations
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(s: &str) -> OperationId {
        OperationId::from(s)
    }

    fn progress(id: &str, done: u64, percent: f32) -> ProgressEvent {
        ProgressEvent::Progress {
            id: op(id),
            done_units: done,
            total_units: 100,
            rate: Some(10),
            percent,
        }
    }

    #[test]
    fn test_started_activates() {
        let rec = reduce(
            None,
            &ProgressEvent::Started {
                id: op("x"),
                display_name: "Patch A".into(),
                total_units: 500,
            },
        );
        assert_eq!(rec.status, ProgressStatus::Active);
        assert_eq!(rec.display_name, "Patch A");
        assert_eq!(rec.total_units, 500);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let rec = reduce(None, &progress("x", 60, 60.0));
        let rec = reduce(Some(rec), &progress("x", 30, 30.0));
        assert_eq!(rec.completed_units, 60);
        assert_eq!(rec.percent, 60.0);
    }

    #[test]
    fn test_percent_clamped_and_nan_ignored() {
        let rec = reduce(None, &progress("x", 10, 250.0));
        assert_eq!(rec.percent, 100.0);
        let rec = reduce(None, &progress("x", 10, -5.0));
        assert_eq!(rec.percent, 0.0);
        let rec = reduce(Some(reduce(None, &progress("x", 1, 40.0))), &progress("x", 2, f32::NAN));
        assert_eq!(rec.percent, 40.0);
    }

    #[test]
    fn test_completed_sets_full_percent() {
        let rec = reduce(None, &progress("x", 50, 50.0));
        let rec = reduce(Some(rec), &ProgressEvent::Completed { id: op("x") });
        assert_eq!(rec.status, ProgressStatus::Completed);
        assert_eq!(rec.percent, 100.0);
        assert_eq!(rec.completed_units, 100);
    }

    #[test]
    fn test_terminal_is_final() {
        let rec = reduce(
            None,
            &ProgressEvent::Failed {
                id: op("x"),
                reason: "boom".into(),
            },
        );
        let rec = reduce(Some(rec), &ProgressEvent::Completed { id: op("x") });
        assert_eq!(rec.status, ProgressStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("boom"));
        let rec = reduce(Some(rec), &progress("x", 99, 99.0));
        assert_eq!(rec.percent, 0.0);
    }

    #[test]
    fn test_board_rejects_unknown_ids() {
        let mut board = ProgressBoard::new();
        board.begin_run([op("a")]);
        assert_eq!(board.apply(&progress("b", 1, 1.0)), ApplyOutcome::UnknownId);
        assert_eq!(board.violations(), 1);
        assert!(board.get(&op("b")).is_none());
        assert_eq!(board.apply(&progress("a", 1, 1.0)), ApplyOutcome::Recorded);
    }

    #[test]
    fn test_board_ignores_after_terminal() {
        let mut board = ProgressBoard::new();
        board.apply(&ProgressEvent::Completed { id: op("a") });
        assert_eq!(
            board.apply(&ProgressEvent::Failed {
                id: op("a"),
                reason: "late".into()
            }),
            ApplyOutcome::IgnoredTerminal
        );
        assert_eq!(board.completed(), vec![op("a")]);
    }

    #[test]
    fn test_seal_unfinished() {
        let mut board = ProgressBoard::new();
        board.begin_run([op("a"), op("b"), op("c")]);
        board.apply(&progress("a", 5, 5.0));
        board.apply(&ProgressEvent::Completed { id: op("b") });
        assert!(!board.is_settled());

        let sealed = board.seal_unfinished("no terminal event");
        assert_eq!(sealed, vec![op("a"), op("c")]);
        assert!(board.is_settled());
        let a = board.get(&op("a")).unwrap();
        assert_eq!(a.status, ProgressStatus::Failed);
        assert!(a.error.as_deref().unwrap().starts_with("Protocol violation"));
        assert_eq!(board.get(&op("b")).unwrap().status, ProgressStatus::Completed);
    }

    #[test]
    fn test_begin_run_clears_records() {
        let mut board = ProgressBoard::new();
        board.apply(&progress("a", 5, 5.0));
        board.begin_run([op("z")]);
        assert!(board.is_empty());
        assert_eq!(board.violations(), 0);
    }
}
