//! Configuration session: the current selection and variant choices.
//!
//! All selection changes go through the resolver; the session only stores the
//! result. Variant choices are kept per module and default to index 0.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::error::{PatcherError, Result};
use crate::logic::resolver::{self, Selection};
use crate::presets::Preset;
use crate::types::ModuleId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    selection: Selection,
    variants: BTreeMap<ModuleId, usize>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from what is already installed, so a fresh session plans no changes.
    pub fn from_installed(installed: &Selection) -> Self {
        Self {
            selection: installed.clone(),
            variants: BTreeMap::new(),
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn variants(&self) -> &BTreeMap<ModuleId, usize> {
        &self.variants
    }

    pub fn is_selected(&self, id: &ModuleId) -> bool {
        self.selection.contains(id)
    }

    /// Toggle one module (or its linked group). Returns true if anything changed.
    pub fn toggle(&mut self, catalog: &Catalog, id: &ModuleId) -> bool {
        let next = resolver::toggle(catalog, id, &self.selection);
        let changed = next != self.selection;
        self.selection = next;
        changed
    }

    /// Replace the selection with a preset's dependency- and group-closed set.
    pub fn apply_preset(&mut self, catalog: &Catalog, preset: Preset) {
        let requested: Selection = preset.modules().into_iter().collect();
        self.selection = resolver::close_selection(catalog, &requested);
        tracing::info!(
            preset = %preset,
            modules = self.selection.len(),
            "Applied preset"
        );
    }

    /// Replace the selection with a previously saved one, closed the same way
    /// a preset is.
    pub fn restore(&mut self, catalog: &Catalog, ids: &[ModuleId]) {
        let requested: Selection = ids.iter().cloned().collect();
        self.selection = resolver::close_selection(catalog, &requested);
    }

    /// Choose a variant for a module. Fails with `InvalidVariant` when the
    /// index is out of range.
    pub fn set_variant(&mut self, catalog: &Catalog, id: &ModuleId, index: usize) -> Result<()> {
        let module = catalog.require(id)?;
        let available = module.variants.len().max(1);
        if index >= available {
            return Err(PatcherError::InvalidVariant {
                module: id.clone(),
                index,
            });
        }
        self.variants.insert(id.clone(), index);
        Ok(())
    }

    /// Whether a variant was chosen explicitly in this session.
    pub fn has_variant_choice(&self, id: &ModuleId) -> bool {
        self.variants.contains_key(id)
    }

    pub fn variant_for(&self, id: &ModuleId) -> usize {
        self.variants.get(id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DownloadLink, Group, Module};
    use crate::types::Provider;

    fn catalog() -> Catalog {
        let modules = vec![
            Module::new("A", "Characters"),
            Module::new("B", "Buildings"),
            Module::new("D", "Doodads"),
            Module::new("E", "Environment"),
            Module::new("G", "Gear"),
            Module::new("I", "Interface"),
            Module::new("M", "Maps"),
            Module::new("L", "Extra")
                .with_dependencies(["A", "G"])
                .with_variants(["Regular", "Slim"])
                .with_link(DownloadLink::new(Provider::Direct, "l0"))
                .with_link(DownloadLink::new(Provider::Direct, "l1")),
        ];
        let groups = vec![Group {
            name: "Environment Pack".into(),
            description: String::new(),
            ids: vec!["B".into(), "D".into(), "E".into()],
            linked: true,
        }];
        Catalog::new(modules, groups).unwrap()
    }

    #[test]
    fn test_toggle_reports_change() {
        let cat = catalog();
        let mut s = Session::new();
        assert!(!s.toggle(&cat, &"L".into()));
        assert!(s.toggle(&cat, &"A".into()));
        assert!(s.is_selected(&"A".into()));
    }

    #[test]
    fn test_preset_drops_unknown_ids() {
        let cat = catalog();
        let mut s = Session::new();
        s.apply_preset(&cat, Preset::High);
        // C, S and V are not in this catalog
        let expected: Selection = ["A", "B", "D", "E", "G", "I", "M"]
            .iter()
            .map(|s| ModuleId::from(*s))
            .collect();
        assert_eq!(s.selection(), &expected);
    }

    #[test]
    fn test_restore_closes_linked_groups() {
        let cat = catalog();
        let mut s = Session::new();
        s.restore(&cat, &["E".into(), "L".into()]);
        assert_eq!(s.selection().len(), 6);
    }

    #[test]
    fn test_variant_bounds() {
        let cat = catalog();
        let mut s = Session::new();
        assert_eq!(s.variant_for(&"L".into()), 0);
        s.set_variant(&cat, &"L".into(), 1).unwrap();
        assert_eq!(s.variant_for(&"L".into()), 1);
        let err = s.set_variant(&cat, &"L".into(), 2).unwrap_err();
        assert!(matches!(err, PatcherError::InvalidVariant { index: 2, .. }));
        // Modules without variants only accept 0
        assert!(s.set_variant(&cat, &"A".into(), 1).is_err());
        assert!(s.set_variant(&cat, &"A".into(), 0).is_ok());
    }

    #[test]
    fn test_set_variant_unknown_module() {
        let cat = catalog();
        let mut s = Session::new();
        let err = s.set_variant(&cat, &"ZZ".into(), 0).unwrap_err();
        assert!(matches!(err, PatcherError::UnknownModule(_)));
    }
}
