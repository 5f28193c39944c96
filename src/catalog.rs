//! Module catalog: the static list of patch modules and their groups.
//!
//! The catalog is loaded once and never mutated. Construction validates the
//! graph so the resolver and planner can assume every referenced id exists.
//!
//! # Design
//!
//! - **Validated at the edge**: `Catalog::new` is the only constructor and it
//!   rejects duplicate ids, orphan references and overlapping linked groups
//! - **Indexed once**: id lookup and the `module -> linked group` index are
//!   built at construction time
//! - **Serde model**: the JSON file maps 1:1 onto `CatalogFile`

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{PatcherError, Result};
use crate::types::{ModuleId, Provider};

// ============================================================================
// Data Model
// ============================================================================

/// One place a module's archive can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    #[serde(default)]
    pub provider: Provider,
    pub url: String,
    /// Label of the variant this link serves, if the module has variants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl DownloadLink {
    pub fn new(provider: Provider, url: impl Into<String>) -> Self {
        Self {
            provider,
            url: url.into(),
            variant: None,
        }
    }
}

/// A selectable content-patch module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub links: Vec<DownloadLink>,
    #[serde(default)]
    pub dependencies: BTreeSet<ModuleId>,
    #[serde(default)]
    pub conflicts: BTreeSet<ModuleId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
}

impl Module {
    /// Minimal module with no links or constraints.
    pub fn new(id: impl Into<ModuleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            links: Vec::new(),
            dependencies: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            variants: Vec::new(),
            author: None,
            info_url: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conflicts<I, S>(mut self, conflicts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleId>,
    {
        self.conflicts = conflicts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link(mut self, link: DownloadLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_variants<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = labels.into_iter().map(Into::into).collect();
        self
    }

    /// A module "has variants" only when there is an actual choice to make.
    pub fn has_variants(&self) -> bool {
        self.variants.len() > 1
    }

    pub fn archive_file_name(&self) -> String {
        self.id.archive_file_name()
    }
}

/// Named set of modules; linked groups are selected all-or-none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub ids: Vec<ModuleId>,
    #[serde(default)]
    pub linked: bool,
}

impl Group {
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.ids.contains(id)
    }
}

/// On-disk catalog format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub modules: Vec<Module>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Validated, indexed module catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    modules: Vec<Module>,
    groups: Vec<Group>,
    by_id: HashMap<ModuleId, usize>,
    linked_index: HashMap<ModuleId, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting any structural defect.
    pub fn new(modules: Vec<Module>, groups: Vec<Group>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(modules.len());
        for (idx, module) in modules.iter().enumerate() {
            if by_id.insert(module.id.clone(), idx).is_some() {
                return Err(PatcherError::catalog_defect(format!(
                    "duplicate module id {}",
                    module.id
                )));
            }
        }

        for module in &modules {
            for dep in &module.dependencies {
                if !by_id.contains_key(dep) {
                    return Err(PatcherError::catalog_defect(format!(
                        "module {} depends on unknown module {}",
                        module.id, dep
                    )));
                }
            }
            for conflict in &module.conflicts {
                if !by_id.contains_key(conflict) {
                    return Err(PatcherError::catalog_defect(format!(
                        "module {} conflicts with unknown module {}",
                        module.id, conflict
                    )));
                }
            }
            // Variant links must line up with the variant labels
            if module.has_variants() && module.links.len() < module.variants.len() {
                return Err(PatcherError::catalog_defect(format!(
                    "module {} has {} variants but only {} links",
                    module.id,
                    module.variants.len(),
                    module.links.len()
                )));
            }
        }

        let mut linked_index = HashMap::new();
        for (gidx, group) in groups.iter().enumerate() {
            for id in &group.ids {
                if !by_id.contains_key(id) {
                    return Err(PatcherError::catalog_defect(format!(
                        "group '{}' lists unknown module {}",
                        group.name, id
                    )));
                }
                if group.linked {
                    if let Some(prev) = linked_index.insert(id.clone(), gidx) {
                        if prev != gidx {
                            return Err(PatcherError::catalog_defect(format!(
                                "module {} belongs to more than one linked group",
                                id
                            )));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            modules = modules.len(),
            groups = groups.len(),
            linked = linked_index.len(),
            "Catalog validated"
        );

        Ok(Self {
            modules,
            groups,
            by_id,
            linked_index,
        })
    }

    pub fn from_file_model(file: CatalogFile) -> Result<Self> {
        Self::new(file.modules, file.groups)
    }

    /// Parse and validate a catalog from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| PatcherError::catalog_defect(format!("malformed catalog: {}", e)))?;
        Self::from_file_model(file)
    }

    /// Read a catalog file. A file that can't be read is `CatalogUnavailable`;
    /// a file that reads but doesn't validate is `CatalogDefect`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PatcherError::catalog_unavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn get(&self, id: &ModuleId) -> Option<&Module> {
        self.by_id.get(id).map(|&idx| &self.modules[idx])
    }

    /// Lookup that turns an absent id into `UnknownModule`.
    pub fn require(&self, id: &ModuleId) -> Result<&Module> {
        self.get(id)
            .ok_or_else(|| PatcherError::UnknownModule(id.clone()))
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Modules in catalog order
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.iter().map(|m| &m.id)
    }

    /// The linked group `id` belongs to, if any.
    pub fn linked_group_of(&self, id: &ModuleId) -> Option<&Group> {
        self.linked_index.get(id).map(|&gidx| &self.groups[gidx])
    }

    /// Display name for an id, falling back to the id itself.
    pub fn display_name(&self, id: &ModuleId) -> String {
        self.get(id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, ids: &[&str], linked: bool) -> Group {
        Group {
            name: name.to_string(),
            description: String::new(),
            ids: ids.iter().map(|s| ModuleId::from(*s)).collect(),
            linked,
        }
    }

    #[test]
    fn test_duplicate_id_is_defect() {
        let err = Catalog::new(vec![Module::new("A", "one"), Module::new("A", "two")], vec![])
            .unwrap_err();
        assert!(matches!(err, PatcherError::CatalogDefect(_)));
    }

    #[test]
    fn test_orphan_dependency_is_defect() {
        let err = Catalog::new(
            vec![Module::new("L", "Extra").with_dependencies(["A", "G"])],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown module A"));
    }

    #[test]
    fn test_orphan_conflict_is_defect() {
        let err = Catalog::new(
            vec![Module::new("Q", "Alt env").with_conflicts(["E"])],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, PatcherError::CatalogDefect(_)));
    }

    #[test]
    fn test_module_in_two_linked_groups_is_defect() {
        let modules = vec![Module::new("B", "b"), Module::new("D", "d")];
        let err = Catalog::new(
            modules,
            vec![group("one", &["B", "D"], true), group("two", &["D"], true)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one linked group"));
    }

    #[test]
    fn test_unlinked_groups_may_overlap() {
        let modules = vec![Module::new("A", "a")];
        let catalog = Catalog::new(
            modules,
            vec![group("one", &["A"], false), group("two", &["A"], false)],
        )
        .unwrap();
        assert!(catalog.linked_group_of(&ModuleId::from("A")).is_none());
    }

    #[test]
    fn test_linked_index() {
        let modules = vec![
            Module::new("B", "b"),
            Module::new("D", "d"),
            Module::new("E", "e"),
            Module::new("A", "a"),
        ];
        let catalog =
            Catalog::new(modules, vec![group("Environment Pack", &["B", "D", "E"], true)])
                .unwrap();
        let g = catalog.linked_group_of(&ModuleId::from("D")).unwrap();
        assert_eq!(g.name, "Environment Pack");
        assert!(catalog.linked_group_of(&ModuleId::from("A")).is_none());
    }

    #[test]
    fn test_variants_need_matching_links() {
        let m = Module::new("L", "Extra")
            .with_variants(["Regular", "Slim"])
            .with_link(DownloadLink::new(Provider::Direct, "l-regular.mpq"));
        let err = Catalog::new(vec![m], vec![]).unwrap_err();
        assert!(err.to_string().contains("2 variants"));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "modules": [
                {"id": "A", "name": "Characters", "links": [{"provider": "mediafire", "url": "https://x/a"}]},
                {"id": "L", "name": "Extra", "dependencies": ["A"], "infoUrl": "https://x/l"}
            ],
            "groups": [{"name": "Core", "ids": ["A"]}]
        }"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        let l = catalog.get(&ModuleId::from("L")).unwrap();
        assert!(l.dependencies.contains(&ModuleId::from("A")));
        assert_eq!(l.info_url.as_deref(), Some("https://x/l"));
        assert_eq!(
            catalog.get(&ModuleId::from("A")).unwrap().links[0].provider,
            Provider::Mediafire
        );
    }

    #[test]
    fn test_malformed_json_is_defect() {
        let err = Catalog::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PatcherError::CatalogDefect(_)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = Catalog::load_from_file(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(matches!(err, PatcherError::CatalogUnavailable(_)));
    }

    #[test]
    fn test_has_variants_needs_two() {
        assert!(!Module::new("A", "a").with_variants(["only"]).has_variants());
        assert!(Module::new("A", "a").with_variants(["x", "y"]).has_variants());
    }
}
