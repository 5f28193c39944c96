//! hdpatcher - Main entry point
//!
//! Loads the configuration, wires the filesystem collaborators into a
//! `Patcher` and runs one command against it.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hdpatcher::app::{Patcher, PatcherOptions};
use hdpatcher::catalog::Catalog;
use hdpatcher::cli::{Cli, Commands, SelectionArgs};
use hdpatcher::config_file::PatcherConfig;
use hdpatcher::local::{self, settings::SettingsStore};
use hdpatcher::logic::resolver;
use hdpatcher::report;
use hdpatcher::types::ModuleId;

/// Initialize tracing; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("CLI arguments parsed");

    let mut config = PatcherConfig::load_or_default(cli.config.as_deref())?;
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = catalog.clone();
    }
    config.validate().context("Invalid configuration")?;

    match &cli.command {
        Commands::Presets => {
            print!("{}", report::render_presets());
            return Ok(());
        }
        Commands::CheckCatalog { path } => {
            check_catalog(path.as_deref().unwrap_or(config.catalog_path.as_path()));
            return Ok(());
        }
        _ => {}
    }

    let mut patcher = start_patcher(&config, cli.game_dir.clone()).await?;
    let store = SettingsStore::new(&config.settings_path);
    match &cli.command {
        Commands::List => print_catalog(&patcher),
        Commands::Plan { selection } => {
            apply_selection(&mut patcher, selection, &store)?;
            print_selection_issues(&patcher)?;
            println!("{}", patcher.plan().summary());
            print_unapplied_variants(&patcher);
            Ok(())
        }
        Commands::Apply { selection } => run_apply(&mut patcher, selection, &store).await,
        Commands::Verify => run_verify(&mut patcher).await,
        Commands::Repair { modules } => run_repair(&mut patcher, modules).await,
        Commands::Presets | Commands::CheckCatalog { .. } => Ok(()),
    }
}

/// Validate a catalog file and print a one-line verdict.
fn check_catalog(path: &Path) {
    info!("Checking catalog: {}", path.display());
    match Catalog::load_from_file(path) {
        Ok(catalog) => {
            println!(
                "✓ Catalog is valid: {} module(s), {} group(s)",
                catalog.len(),
                catalog.groups().len()
            );
        }
        Err(e) => {
            error!("Catalog check failed: {}", e);
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

async fn start_patcher(config: &PatcherConfig, game_dir: Option<PathBuf>) -> Result<Patcher> {
    let services = local::services_from_config(config, game_dir.clone())?;
    let mut options = PatcherOptions::new(&config.downloads_dir);
    if let Some(timeout) = config.transfer_timeout() {
        options = options.with_timeout(timeout);
    }

    let mut patcher = Patcher::new(services, options);
    patcher.startup().await.context("Startup failed")?;
    if let Some(dir) = game_dir {
        patcher
            .choose_folder(Some(dir))
            .await
            .context("Could not use the given installation folder")?;
    }
    Ok(patcher)
}

fn print_catalog(patcher: &Patcher) -> Result<()> {
    match patcher.game_dir() {
        Some(dir) => println!("Installation: {}\n", dir.display()),
        None => println!("Installation: not found (use --game-dir)\n"),
    }
    print!(
        "{}",
        report::render_catalog(patcher.catalog()?, patcher.session(), patcher.installed())
    );
    Ok(())
}

/// Build the selection from the command-line flags, in order:
/// restore, preset, toggles, variants.
fn apply_selection(patcher: &mut Patcher, args: &SelectionArgs, store: &SettingsStore) -> Result<()> {
    if args.restore {
        let saved = store.load().selected_modules;
        debug!(modules = saved.len(), "Restoring saved selection");
        patcher.restore_selection(&saved)?;
    }
    if let Some(preset) = args.preset {
        info!("Applying preset '{}'", preset);
        patcher.apply_preset(preset)?;
    }
    for raw in &args.toggles {
        let id = ModuleId::from(raw.trim());
        if patcher.toggle(&id)? {
            continue;
        }
        let catalog = patcher.catalog()?;
        match catalog.get(&id) {
            None => warn!(module = %id, "Unknown module ignored"),
            Some(module) => match resolver::lock_reason(module, patcher.selection()) {
                Some(reason) => eprintln!("✗ {} is locked: {}", id, reason),
                None => eprintln!("✗ {} can't be toggled: its group isn't selectable", id),
            },
        }
    }
    for (id, index) in &args.variants {
        patcher.set_variant(id, *index)?;
    }
    Ok(())
}

fn print_selection_issues(patcher: &Patcher) -> Result<()> {
    for issue in resolver::validate_selection(patcher.catalog()?, patcher.selection()) {
        eprintln!("✗ {}", issue);
    }
    Ok(())
}

fn print_unapplied_variants(patcher: &Patcher) {
    for id in patcher.unapplied_variant_changes() {
        eprintln!(
            "✗ {} is already installed; deselect it and apply, then select it again to switch variants",
            id
        );
    }
}

async fn run_apply(patcher: &mut Patcher, args: &SelectionArgs, store: &SettingsStore) -> Result<()> {
    if args.is_empty() {
        println!("Nothing selected to change. Use --preset, --toggle or --restore.");
        return Ok(());
    }
    apply_selection(patcher, args, store)?;
    print_unapplied_variants(patcher);
    let result = patcher.apply().await;

    print!(
        "{}",
        report::render_progress("Downloads", &patcher.download_snapshot())
    );
    print!(
        "{}",
        report::render_progress("Installs", &patcher.install_snapshot())
    );
    let outcome = result?;
    print!("{}", report::render_apply(&outcome));

    let selected: Vec<ModuleId> = patcher.selection().iter().cloned().collect();
    if let Err(e) = store.update(|s| s.selected_modules = selected) {
        warn!(error = %e, "Could not save the selection");
    }

    if !outcome.is_clean() {
        bail!("{} module(s) failed", outcome.failed.len());
    }
    Ok(())
}

async fn run_verify(patcher: &mut Patcher) -> Result<()> {
    let results = patcher.verify(None).await?;
    print!("{}", report::render_verify(&results));
    if !patcher.failures().is_empty() {
        bail!("{} module(s) need repair", patcher.failures().len());
    }
    Ok(())
}

async fn run_repair(patcher: &mut Patcher, modules: &[String]) -> Result<()> {
    let outcomes = if modules.is_empty() {
        patcher.verify_and_repair().await?
    } else {
        let ids: Vec<ModuleId> = modules.iter().map(|m| ModuleId::from(m.trim())).collect();
        patcher.repair(&ids).await?
    };
    print!("{}", report::render_progress("Repairs", &patcher.install_snapshot()));
    print!("{}", report::render_repair(&outcomes));
    if outcomes.iter().any(|o| !o.success) {
        bail!("repair finished with failures");
    }
    Ok(())
}
