//! Reconciliation Planner
//!
//! Diffs the desired selection against the installed set and produces the
//! work needed to converge one onto the other.
//!
//! | Bucket       | Contents |
//! |--------------|----------|
//! | to_uninstall | `installed \ selection` |
//! | to_install   | `selection \ installed` |
//! | unchanged    | `selection ∩ installed` |
//!
//! # Design
//!
//! - **Pure logic**: No I/O, never mutates its inputs
//! - **Total**: every pair of sets yields a plan; there is no error path
//! - **Ordered**: `steps()` lists every uninstall before any install

use std::fmt;

use crate::logic::resolver::Selection;
use crate::types::ModuleId;

// ============================================================================
// Plan Types
// ============================================================================

/// A single step of an apply run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Uninstall(ModuleId),
    Install(ModuleId),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninstall(id) => write!(f, "Uninstall({})", id),
            Self::Install(id) => write!(f, "Install({})", id),
        }
    }
}

/// Difference between the desired selection and the installed set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    pub to_install: Selection,
    pub to_uninstall: Selection,
    pub unchanged: Selection,
}

impl WorkPlan {
    pub fn has_changes(&self) -> bool {
        !self.to_install.is_empty() || !self.to_uninstall.is_empty()
    }

    /// Steps in execution order: all uninstalls, then all installs.
    pub fn steps(&self) -> Vec<WorkItem> {
        self.to_uninstall
            .iter()
            .cloned()
            .map(WorkItem::Uninstall)
            .chain(self.to_install.iter().cloned().map(WorkItem::Install))
            .collect()
    }

    /// Human-readable summary of the plan.
    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return format!(
                "Plan: no changes ({} module(s) already installed)",
                self.unchanged.len()
            );
        }
        let mut lines = vec![
            format!("Plan: {} change(s)", self.to_install.len() + self.to_uninstall.len()),
            format!("  Unchanged: {}", join(&self.unchanged)),
            format!("  Steps ({}):", self.to_install.len() + self.to_uninstall.len()),
        ];
        for (i, step) in self.steps().iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, step));
        }
        lines.join("\n")
    }
}

fn join(ids: &Selection) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(ModuleId::as_str).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Plan Calculation
// ============================================================================

/// Compute the work plan converging `installed` onto `selection`.
///
/// # What This Explicitly Refuses To Do
///
/// - Validate the selection: that's the resolver's job before an apply
/// - Order installs by dependency: installs within a phase are independent
pub fn plan(selection: &Selection, installed: &Selection) -> WorkPlan {
    WorkPlan {
        to_install: selection.difference(installed).cloned().collect(),
        to_uninstall: installed.difference(selection).cloned().collect(),
        unchanged: selection.intersection(installed).cloned().collect(),
    }
}
