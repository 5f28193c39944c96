use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::presets::Preset;
use crate::types::ModuleId;

/// hdpatcher - HD content-patch manager
#[derive(Parser, Debug)]
#[command(name = "hdpatcher")]
#[command(about = "Select, plan and install optional HD patch modules for a game installation")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Module catalog JSON, overriding the configured one
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Game installation folder; validated and remembered for later runs
    #[arg(long, global = true)]
    pub game_dir: Option<PathBuf>,

    /// Verbose logging (debug level unless RUST_LOG says otherwise)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List catalog modules with their selection and install state
    List,
    /// Show the available quality presets
    Presets,
    /// Show the work needed to reach a selection
    Plan {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Converge the installation onto a selection
    Apply {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Check installed modules against their downloaded archives
    Verify,
    /// Re-install modules from their downloaded archives
    Repair {
        /// Modules to repair (default: whatever verify reports as broken)
        #[arg(value_delimiter = ',')]
        modules: Vec<String>,
    },
    /// Validate a catalog file and print a summary
    CheckCatalog {
        /// Catalog to check (defaults to the configured catalog)
        path: Option<PathBuf>,
    },
}

/// How to build the selection for `plan` and `apply`
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Start from the selection saved by the last apply
    #[arg(long)]
    pub restore: bool,

    /// Replace the selection with a preset (low, medium, high, ultra)
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Toggle modules, applied in order after the preset
    #[arg(long = "toggle", value_delimiter = ',')]
    pub toggles: Vec<String>,

    /// Choose a variant, e.g. `--variant L=1`
    #[arg(long = "variant", value_parser = parse_variant)]
    pub variants: Vec<(ModuleId, usize)>,
}

impl SelectionArgs {
    pub fn is_empty(&self) -> bool {
        !self.restore && self.preset.is_none() && self.toggles.is_empty() && self.variants.is_empty()
    }
}

/// Parse `ID=INDEX`.
pub fn parse_variant(s: &str) -> Result<(ModuleId, usize), String> {
    let (id, index) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=INDEX, got '{}'", s))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("missing module id in '{}'", s));
    }
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid variant index in '{}': {}", s, e))?;
    Ok((ModuleId::from(id), index))
}
