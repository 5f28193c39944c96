//! Selection Resolver
//!
//! Decides which modules may be selected given the current selection, and is
//! the only code allowed to change a selection.
//!
//! # Design
//!
//! - **Pure logic**: No I/O, no side effects; every function takes the
//!   selection by reference and returns a new one
//! - **Locks are silent**: toggling a locked module is a no-op, not an error
//! - **Linked groups move together**: toggling any member of a linked group
//!   adds or removes the whole group in one step
//!
//! # Rules
//!
//! | Check        | Result |
//! |--------------|--------|
//! | dependencies | `missing = deps \ selection` |
//! | conflicts    | `conflicting = conflicts ∩ selection` |
//! | selectable   | no missing dependencies and no conflicts |

use std::collections::BTreeSet;

use crate::catalog::{Catalog, Module};
use crate::error::PatcherError;
use crate::types::ModuleId;

/// A set of selected module ids. Ordered so plans and reports are deterministic.
pub type Selection = BTreeSet<ModuleId>;

/// Outcome of checking a module's dependencies against a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub satisfied: bool,
    pub missing: Vec<ModuleId>,
}

/// Outcome of checking a module's conflicts against a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictStatus {
    pub has_conflict: bool,
    pub conflicting: Vec<ModuleId>,
}

// ============================================================================
// Constraint Checks
// ============================================================================

pub fn dependency_status(module: &Module, selection: &Selection) -> DependencyStatus {
    let missing: Vec<ModuleId> = module
        .dependencies
        .iter()
        .filter(|dep| !selection.contains(*dep))
        .cloned()
        .collect();
    DependencyStatus {
        satisfied: missing.is_empty(),
        missing,
    }
}

pub fn conflict_status(module: &Module, selection: &Selection) -> ConflictStatus {
    let conflicting: Vec<ModuleId> = module
        .conflicts
        .iter()
        .filter(|c| selection.contains(*c))
        .cloned()
        .collect();
    ConflictStatus {
        has_conflict: !conflicting.is_empty(),
        conflicting,
    }
}

/// Returns true if `module` could be added to `selection`.
pub fn is_selectable(module: &Module, selection: &Selection) -> bool {
    lock_reason(module, selection).is_none()
}

/// Why `module` can't be added to `selection`, or `None` if it can.
///
/// Missing dependencies are reported before conflicts.
pub fn lock_reason(module: &Module, selection: &Selection) -> Option<PatcherError> {
    let deps = dependency_status(module, selection);
    if !deps.satisfied && !module.dependencies.is_empty() {
        return Some(PatcherError::DependencyUnsatisfied {
            module: module.id.clone(),
            missing: deps.missing,
        });
    }
    let conflicts = conflict_status(module, selection);
    if conflicts.has_conflict {
        return Some(PatcherError::ConflictDetected {
            module: module.id.clone(),
            conflicting: conflicts.conflicting,
        });
    }
    None
}

// ============================================================================
// Selection Mutation
// ============================================================================

/// Toggle `id` in `selection`.
///
/// - Member of a linked group: if any member is selected, remove all of
///   them; otherwise add all of them, provided every member is selectable
///   against the resulting selection.
/// - Anything else: remove it if selected, add it if selectable.
///
/// A locked module can't be toggled in either direction: removing a selected
/// module whose dependencies are gone, or that conflicts with the selection,
/// is a no-op too. Unknown ids leave the selection unchanged.
pub fn toggle(catalog: &Catalog, id: &ModuleId, selection: &Selection) -> Selection {
    let Some(module) = catalog.get(id) else {
        tracing::warn!(module = %id, "Toggle ignored: module not in catalog");
        return selection.clone();
    };

    if let Some(group) = catalog.linked_group_of(id) {
        let mut next = selection.clone();
        if group.ids.iter().any(|m| selection.contains(m)) {
            if let Some(reason) = lock_reason(module, selection) {
                tracing::debug!(group = %group.name, %reason, "Linked group locked");
                return selection.clone();
            }
            for member in &group.ids {
                next.remove(member);
            }
            return next;
        }

        // Members may depend on each other, so check against the union
        next.extend(group.ids.iter().cloned());
        for member in &group.ids {
            if let Some(m) = catalog.get(member) {
                if let Some(reason) = lock_reason(m, &next) {
                    tracing::debug!(group = %group.name, %reason, "Linked group locked");
                    return selection.clone();
                }
            }
        }
        return next;
    }

    if let Some(reason) = lock_reason(module, selection) {
        tracing::debug!(module = %id, %reason, "Module locked");
        return selection.clone();
    }
    let mut next = selection.clone();
    if !next.remove(id) {
        next.insert(id.clone());
    }
    next
}

/// Transitive closure of `ids` over dependency edges.
///
/// Ids the catalog doesn't know are dropped with a warning. Cycles and
/// self-references terminate because each id is visited once.
pub fn expand_with_dependencies<'a, I>(catalog: &Catalog, ids: I) -> Selection
where
    I: IntoIterator<Item = &'a ModuleId>,
{
    let mut visited = Selection::new();
    let mut stack: Vec<ModuleId> = Vec::new();

    for id in ids {
        if catalog.contains(id) {
            stack.push(id.clone());
        } else {
            tracing::warn!(module = %id, "Dropping unknown module from expansion");
        }
    }

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if let Some(module) = catalog.get(&id) {
            for dep in &module.dependencies {
                if !visited.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }
    }

    visited
}

/// Add every missing member of each linked group that is partly selected.
pub fn close_linked_groups(catalog: &Catalog, selection: &Selection) -> Selection {
    let mut next = selection.clone();
    for id in selection {
        if let Some(group) = catalog.linked_group_of(id) {
            next.extend(group.ids.iter().cloned());
        }
    }
    next
}

/// Closure over both dependency edges and linked groups, to a fixed point.
pub fn close_selection(catalog: &Catalog, ids: &Selection) -> Selection {
    let mut current = expand_with_dependencies(catalog, ids.iter());
    loop {
        let linked = close_linked_groups(catalog, &current);
        let next = expand_with_dependencies(catalog, linked.iter());
        if next == current {
            return current;
        }
        current = next;
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Every constraint `selection` violates. Empty means the selection may be
/// applied.
///
/// A partly selected linked group is reported as a dependency problem on
/// each selected member, listing the absent members as missing.
pub fn validate_selection(catalog: &Catalog, selection: &Selection) -> Vec<PatcherError> {
    let mut issues = Vec::new();

    for id in selection {
        let Some(module) = catalog.get(id) else {
            issues.push(PatcherError::UnknownModule(id.clone()));
            continue;
        };

        let deps = dependency_status(module, selection);
        if !deps.satisfied {
            issues.push(PatcherError::DependencyUnsatisfied {
                module: id.clone(),
                missing: deps.missing,
            });
        }

        let conflicts = conflict_status(module, selection);
        if conflicts.has_conflict {
            issues.push(PatcherError::ConflictDetected {
                module: id.clone(),
                conflicting: conflicts.conflicting,
            });
        }

        if let Some(group) = catalog.linked_group_of(id) {
            let absent: Vec<ModuleId> = group
                .ids
                .iter()
                .filter(|m| !selection.contains(*m))
                .cloned()
                .collect();
            if !absent.is_empty() {
                issues.push(PatcherError::DependencyUnsatisfied {
                    module: id.clone(),
                    missing: absent,
                });
            }
        }
    }

    issues
}
