//! Property-Based Tests for hdpatcher
//!
//! Uses proptest for the invariants the selection rules, the planner and the
//! progress reducer must hold for every input:
//! - Dependency and conflict gating
//! - Linked groups move all-or-none
//! - Plans never install and uninstall the same module
//! - Progress is monotonic and terminal status is final
//! - Dependency expansion is idempotent, even over cycles

mod common;

use proptest::prelude::*;
use std::collections::BTreeSet;

use hdpatcher::catalog::{Catalog, Module};
use hdpatcher::engine::plan::plan;
use hdpatcher::logic::resolver::{self, Selection};
use hdpatcher::progress::{reduce, ProgressEvent, ProgressRecord};
use hdpatcher::types::{ModuleId, OperationId, ProgressStatus};

use common::{ids, sample_catalog};

const LETTERS: &[&str] = &["A", "B", "C", "D", "E", "F", "G", "H"];

/// Strategy for subsets of a fixed alphabet
fn selection_strategy() -> impl Strategy<Value = Selection> {
    prop::collection::btree_set(prop::sample::select(LETTERS), 0..LETTERS.len())
        .prop_map(|set| set.into_iter().map(ModuleId::from).collect())
}

/// Strategy for an arbitrary dependency graph over the alphabet, cycles and
/// self-references included
fn graph_catalog_strategy() -> impl Strategy<Value = Catalog> {
    prop::collection::vec(
        prop::collection::btree_set(prop::sample::select(LETTERS), 0..3),
        LETTERS.len(),
    )
    .prop_map(|deps| {
        let modules = LETTERS
            .iter()
            .zip(deps)
            .map(|(id, d)| Module::new(*id, *id).with_dependencies(d))
            .collect();
        Catalog::new(modules, Vec::new()).unwrap()
    })
}

fn sample_ids() -> Vec<&'static str> {
    vec!["A", "B", "C", "D", "E", "G", "I", "M", "S", "V", "N", "U", "L", "Q"]
}

fn sample_selection_strategy() -> impl Strategy<Value = Selection> {
    prop::collection::btree_set(prop::sample::select(sample_ids()), 0..8)
        .prop_map(|set| set.into_iter().map(ModuleId::from).collect())
}

fn event_strategy() -> impl Strategy<Value = ProgressEvent> {
    let id = OperationId::from("op");
    prop_oneof![
        4 => (0u64..200, 0u64..200, -20.0f32..140.0).prop_map({
            let id = id.clone();
            move |(done, total, percent)| ProgressEvent::Progress {
                id: id.clone(),
                done_units: done,
                total_units: total,
                rate: None,
                percent,
            }
        }),
        1 => Just(ProgressEvent::Started {
            id: id.clone(),
            display_name: "op".to_string(),
            total_units: 100,
        }),
        1 => Just(ProgressEvent::Completed { id: id.clone() }),
        1 => Just(ProgressEvent::Failed {
            id,
            reason: "boom".to_string(),
        }),
    ]
}

// =============================================================================
// Selection Rules
// =============================================================================

proptest! {
    /// A module with dependencies is selectable iff they are all selected
    #[test]
    fn dependency_gating(selection in sample_selection_strategy()) {
        let catalog = sample_catalog();
        let l = catalog.get(&ModuleId::from("L")).unwrap();
        let deps_present = l.dependencies.iter().all(|d| selection.contains(d));
        prop_assert_eq!(resolver::dependency_status(l, &selection).satisfied, deps_present);
        if !deps_present {
            prop_assert!(!resolver::is_selectable(l, &selection));
        }
    }

    /// A module conflicting with anything selected is never selectable
    #[test]
    fn conflict_gating(selection in sample_selection_strategy()) {
        let catalog = sample_catalog();
        let q = catalog.get(&ModuleId::from("Q")).unwrap();
        if selection.contains(&ModuleId::from("E")) {
            prop_assert!(!resolver::is_selectable(q, &selection));
        } else {
            prop_assert!(resolver::is_selectable(q, &selection));
        }
    }

    /// Toggling any member of the linked group leaves it all-or-none
    #[test]
    fn linked_group_all_or_none(
        selection in sample_selection_strategy(),
        member in prop::sample::select(vec!["B", "D", "E"]),
    ) {
        let catalog = sample_catalog();
        // Start from a consistent selection so the group is already whole or empty
        let start = resolver::close_selection(&catalog, &selection);
        let next = resolver::toggle(&catalog, &ModuleId::from(member), &start);
        let present = ["B", "D", "E"]
            .iter()
            .filter(|m| next.contains(&ModuleId::from(**m)))
            .count();
        prop_assert!(present == 0 || present == 3, "partial group: {:?}", next);
    }

    /// Expansion terminates on any graph and is idempotent
    #[test]
    fn expansion_idempotent(catalog in graph_catalog_strategy(), seed in selection_strategy()) {
        let once = resolver::expand_with_dependencies(&catalog, seed.iter());
        let twice = resolver::expand_with_dependencies(&catalog, once.iter());
        prop_assert_eq!(&once, &twice);
        prop_assert!(seed.is_subset(&once));
        for id in &once {
            let module = catalog.get(id).unwrap();
            prop_assert!(module.dependencies.is_subset(&once));
        }
    }
}

// =============================================================================
// Planner
// =============================================================================

proptest! {
    /// Install and uninstall sets never overlap, and the three sets cover
    /// the union of both inputs
    #[test]
    fn plan_sets_disjoint(selection in selection_strategy(), installed in selection_strategy()) {
        let p = plan(&selection, &installed);
        prop_assert!(p.to_install.is_disjoint(&p.to_uninstall));
        let covered: BTreeSet<ModuleId> = p
            .to_install
            .iter()
            .chain(&p.to_uninstall)
            .chain(&p.unchanged)
            .cloned()
            .collect();
        let union: BTreeSet<ModuleId> = selection.union(&installed).cloned().collect();
        prop_assert_eq!(covered, union);
        prop_assert_eq!(p.has_changes(), selection != installed);
    }
}

// =============================================================================
// Progress Reducer
// =============================================================================

proptest! {
    /// Percent and completed units never go backwards
    #[test]
    fn progress_monotonic(events in prop::collection::vec(event_strategy(), 1..40)) {
        let mut record: Option<ProgressRecord> = None;
        for event in &events {
            let before = record.clone();
            let after = reduce(record, event);
            if let Some(prev) = &before {
                prop_assert!(after.percent >= prev.percent);
                prop_assert!(after.completed_units >= prev.completed_units);
            }
            prop_assert!((0.0..=100.0).contains(&after.percent));
            record = Some(after);
        }
    }

    /// Once completed or failed, a record never changes again
    #[test]
    fn terminal_is_final(events in prop::collection::vec(event_strategy(), 1..40)) {
        let mut record: Option<ProgressRecord> = None;
        let mut frozen: Option<ProgressRecord> = None;
        for event in &events {
            let next = reduce(record, event);
            if let Some(f) = &frozen {
                prop_assert_eq!(f, &next);
            } else if matches!(next.status, ProgressStatus::Completed | ProgressStatus::Failed) {
                frozen = Some(next.clone());
            }
            record = Some(next);
        }
    }
}

#[test]
fn high_preset_sample_is_closed() {
    let catalog = sample_catalog();
    let high = ids(&["A", "B", "C", "D", "E", "G", "I", "M", "S", "V"]);
    assert_eq!(resolver::close_selection(&catalog, &high), high);
}
