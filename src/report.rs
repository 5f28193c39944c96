//! Plain-text rendering for the command-line frontend.
//!
//! Every function returns a `String` so the output can be tested without a
//! terminal. Nothing here touches the filesystem or the services.

use std::collections::BTreeMap;
use std::fmt::Write;
use strum::IntoEnumIterator;

use crate::app::ApplyReport;
use crate::catalog::{Catalog, Module};
use crate::logic::resolver::{self, Selection};
use crate::orchestrator::RepairOutcome;
use crate::presets::Preset;
use crate::progress::ProgressRecord;
use crate::session::Session;
use crate::types::{ModuleId, ProgressStatus, VerifyStatus};

// ============================================================================
// Catalog
// ============================================================================

/// Catalog grouped the way the catalog file groups it.
///
/// Each row shows the selection box, the install marker, and why the module
/// can't be selected right now when that applies. Modules in no group are
/// listed under "Other".
pub fn render_catalog(catalog: &Catalog, session: &Session, installed: &Selection) -> String {
    let mut out = String::new();
    let mut listed = Selection::new();

    for group in catalog.groups() {
        let marker = if group.linked { " (installed together)" } else { "" };
        let _ = writeln!(out, "{}{}", group.name, marker);
        if !group.description.is_empty() {
            let _ = writeln!(out, "  {}", group.description);
        }
        for id in &group.ids {
            if let Some(module) = catalog.get(id) {
                out.push_str(&module_row(module, session, installed));
                listed.insert(id.clone());
            }
        }
        out.push('\n');
    }

    let others: Vec<&Module> = catalog
        .modules()
        .iter()
        .filter(|m| !listed.contains(&m.id))
        .collect();
    if !others.is_empty() {
        out.push_str("Other\n");
        for module in others {
            out.push_str(&module_row(module, session, installed));
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "{} selected, {} installed",
        session.selection().len(),
        installed.len()
    );
    out
}

fn module_row(module: &Module, session: &Session, installed: &Selection) -> String {
    let selected = session.is_selected(&module.id);
    let mut row = format!(
        "  [{}] {:<3} {}",
        if selected { "x" } else { " " },
        module.id,
        module.name
    );
    if installed.contains(&module.id) {
        row.push_str(" (installed)");
    }
    if module.has_variants() {
        let index = session.variant_for(&module.id);
        if let Some(label) = module.variants.get(index) {
            let _ = write!(row, " <{}>", label);
        }
    }
    if let Some(reason) = resolver::lock_reason(module, session.selection()) {
        let _ = write!(row, " - locked: {}", reason);
    }
    row.push('\n');
    row
}

pub fn render_presets() -> String {
    let mut out = String::new();
    for preset in Preset::iter() {
        let _ = writeln!(out, "{:<7} {}", preset, preset.description());
        let _ = writeln!(out, "        {}", preset.module_ids().join(", "));
    }
    out
}

// ============================================================================
// Progress & Results
// ============================================================================

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One line per record, in the order the records were first seen.
pub fn render_progress(title: &str, records: &[ProgressRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }
    let mut out = format!("{}:\n", title);
    for record in records {
        let mark = match record.status {
            ProgressStatus::Completed => "✓",
            ProgressStatus::Failed => "✗",
            ProgressStatus::Active => "…",
            ProgressStatus::Pending => " ",
        };
        let _ = write!(
            out,
            "  {} {:<32} {:>5.1}%",
            mark, record.display_name, record.percent
        );
        if record.total_units > 0 {
            let _ = write!(
                out,
                "  {}/{}",
                format_bytes(record.completed_units),
                format_bytes(record.total_units)
            );
        }
        if let Some(rate) = record.rate.filter(|_| record.status == ProgressStatus::Active) {
            let _ = write!(out, "  {}/s", format_bytes(rate));
        }
        if let Some(error) = &record.error {
            let _ = write!(out, "  {}", error);
        }
        out.push('\n');
    }
    out
}

pub fn render_verify(results: &BTreeMap<ModuleId, VerifyStatus>) -> String {
    if results.is_empty() {
        return "Nothing to verify\n".to_string();
    }
    let mut out = String::new();
    for (id, status) in results {
        let mark = if status.needs_repair() { "✗" } else { "✓" };
        let _ = writeln!(out, "  {} {:<3} {}", mark, id, status);
    }
    let broken = results.values().filter(|s| s.needs_repair()).count();
    let _ = writeln!(out, "{} checked, {} need repair", results.len(), broken);
    out
}

pub fn render_apply(report: &ApplyReport) -> String {
    if report.reset_only {
        return "Returned to configuration\n".to_string();
    }
    let mut out = String::new();
    if report.removed.is_empty() && report.installed.is_empty() && report.failed.is_empty() {
        out.push_str("Nothing to do\n");
        return out;
    }
    for id in &report.removed {
        let _ = writeln!(out, "  - removed   {}", id);
    }
    for id in &report.installed {
        let _ = writeln!(out, "  + installed {}", id);
    }
    for (id, reason) in &report.failed {
        let _ = writeln!(out, "  ✗ failed    {}: {}", id, reason);
    }
    if report.completed {
        out.push_str("✓ Apply complete\n");
    } else {
        let _ = writeln!(out, "✗ Apply finished with {} failure(s)", report.failed.len());
    }
    out
}

pub fn render_repair(outcomes: &[RepairOutcome]) -> String {
    if outcomes.is_empty() {
        return "Nothing needs repair\n".to_string();
    }
    let mut out = String::new();
    for outcome in outcomes {
        match &outcome.error {
            None if outcome.success => {
                let _ = writeln!(out, "  ✓ {}", outcome.module);
            }
            error => {
                let _ = writeln!(
                    out,
                    "  ✗ {}: {}",
                    outcome.module,
                    error.as_deref().unwrap_or("unknown")
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Group;
    use crate::types::OperationId;

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                Module::new("A", "Player Characters"),
                Module::new("L", "Extra").with_dependencies(["A"]),
                Module::new("Z", "Loose"),
            ],
            vec![Group {
                name: "Core".to_string(),
                description: String::new(),
                ids: vec!["A".into(), "L".into()],
                linked: false,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_catalog_rows_show_lock_reason() {
        let catalog = catalog();
        let session = Session::new();
        let text = render_catalog(&catalog, &session, &Selection::new());
        assert!(text.contains("[ ] A"));
        assert!(text.contains("locked:"));
        assert!(text.contains("Other"));
        assert!(text.contains("Loose"));
    }

    #[test]
    fn test_module_ids_are_padded_into_a_column() {
        let catalog = catalog();
        let text = render_catalog(&catalog, &Session::new(), &Selection::new());
        assert!(text.contains("[ ] A   Player Characters"));
        assert!(text.contains("[ ] Z   Loose"));
    }

    #[test]
    fn test_catalog_marks_installed() {
        let catalog = catalog();
        let installed: Selection = [ModuleId::from("A")].into_iter().collect();
        let session = Session::from_installed(&installed);
        let text = render_catalog(&catalog, &session, &installed);
        assert!(text.contains("[x] A"));
        assert!(text.contains("(installed)"));
        assert!(text.contains("1 selected, 1 installed"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_progress_lists_failures() {
        let mut record = ProgressRecord::new(OperationId::from("op-1"));
        record.status = ProgressStatus::Failed;
        record.error = Some("Transfer failed: boom".to_string());
        let text = render_progress("Downloads", &[record]);
        assert!(text.starts_with("Downloads:"));
        assert!(text.contains("✗"));
        assert!(text.contains("boom"));
        assert!(render_progress("Downloads", &[]).is_empty());
    }

    #[test]
    fn test_apply_report() {
        assert_eq!(render_apply(&ApplyReport::default()), "Nothing to do\n");
        let report = ApplyReport {
            installed: vec!["A".into()],
            completed: true,
            ..ApplyReport::default()
        };
        let text = render_apply(&report);
        assert!(text.contains("+ installed A"));
        assert!(text.contains("Apply complete"));
    }

    #[test]
    fn test_presets_listed() {
        let text = render_presets();
        for name in ["low", "medium", "high", "ultra"] {
            assert!(text.contains(name));
        }
    }
}
