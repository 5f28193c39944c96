//! Quality presets.
//!
//! A preset is a named starting selection. Applying one goes through the
//! resolver's dependency expansion, so presets only need to list the modules
//! a user actually asked for.
//!
//! | Preset | Modules |
//! |--------|---------|
//! | Low    | I, M |
//! | Medium | A, C, G, I, M, V |
//! | High   | A, B, C, D, E, G, I, M, S, V |
//! | Ultra  | High + U |

use strum::{Display, EnumIter, EnumString};

use crate::types::ModuleId;

/// Named quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Preset {
    /// Minimal HD patches for low-end systems
    Low,
    /// Core visual improvements
    #[default]
    Medium,
    /// Comprehensive HD overhaul
    High,
    /// Maximum quality with 4K textures
    Ultra,
}

impl Preset {
    /// Module ids this preset selects.
    pub fn module_ids(&self) -> &'static [&'static str] {
        match self {
            Preset::Low => &["I", "M"],
            Preset::Medium => &["A", "C", "G", "I", "M", "V"],
            Preset::High => &["A", "B", "C", "D", "E", "G", "I", "M", "S", "V"],
            Preset::Ultra => &["A", "B", "C", "D", "E", "G", "I", "M", "S", "U", "V"],
        }
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        self.module_ids().iter().map(|s| ModuleId::from(*s)).collect()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Preset::Low => "Minimal HD patches for low-end systems",
            Preset::Medium => "Core visual improvements",
            Preset::High => "Comprehensive HD overhaul",
            Preset::Ultra => "Maximum quality with 4K textures",
        }
    }
}

/// Modules no preset selects, with their display names.
pub const OPTIONAL_MODULES: &[(&str, &str)] = &[
    ("L", "A Little Extra for Females"),
    ("N", "Darker Nights"),
    ("O", "Raid Visuals Mod"),
    ("F", "Fog Pushback"),
    ("P", "Pretty Night Sky"),
    ("T", "Dark UI Theme"),
    ("Y", "Blood Enhanced"),
    ("K", "New Combat Sounds"),
    ("H", "Neon Pink Herbs"),
    ("J", "Glow Down (Elf Eye Glow)"),
    ("W", "Boneless Undead"),
    ("X", "High Elf Modifications"),
    ("Q", "Alt HD Environment"),
    ("R", "Faithful Upscale"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_preset_parse() {
        assert_eq!(Preset::from_str("high").unwrap(), Preset::High);
        assert_eq!(Preset::Ultra.to_string(), "ultra");
        assert!(Preset::from_str("extreme").is_err());
    }

    #[test]
    fn test_ultra_is_high_plus_u() {
        let high = Preset::High.modules();
        let ultra = Preset::Ultra.modules();
        assert_eq!(ultra.len(), high.len() + 1);
        assert!(high.iter().all(|id| ultra.contains(id)));
        assert!(ultra.contains(&ModuleId::from("U")));
    }

    #[test]
    fn test_optional_modules_disjoint_from_presets() {
        for preset in Preset::iter() {
            for (id, _) in OPTIONAL_MODULES {
                assert!(!preset.module_ids().contains(id), "{} in {}", id, preset);
            }
        }
    }
}
