//! Application module
//!
//! `Patcher` is the session-scoped controller: it owns the catalog, the
//! selection, the installed set, the progress boards and the state machine,
//! and it is the only place the orchestrators are driven from.
//!
//! # Module Structure
//! - `state` - Option and report types (PatcherOptions, ApplyReport)
//! - Main module - Patcher struct and the startup/apply/verify/repair flows

mod state;

pub use state::{ApplyReport, PatcherOptions};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::app_state::{AppStage, AppStateMachine};
use crate::catalog::Catalog;
use crate::engine::plan::{self, WorkPlan};
use crate::error::{PatcherError, Result};
use crate::logic::resolver::{self, Selection};
use crate::orchestrator::{
    download::{self, DownloadOptions},
    install, maintenance, OperationGate, RepairOutcome,
};
use crate::presets::Preset;
use crate::progress::{ProgressBoard, ProgressRecord};
use crate::services::Services;
use crate::session::Session;
use crate::types::{ModuleId, VerifyStatus};

/// Session controller for one game installation
#[derive(Debug)]
pub struct Patcher {
    services: Services,
    options: PatcherOptions,
    catalog: Option<Catalog>,
    /// Set when startup failed in a way nothing else can recover from
    blocking_error: Option<String>,
    game_dir: Option<PathBuf>,
    installed: Selection,
    session: Session,
    machine: AppStateMachine,
    downloads: ProgressBoard,
    installs: ProgressBoard,
    last_verify: Option<BTreeMap<ModuleId, VerifyStatus>>,
    gate: OperationGate,
}

impl Patcher {
    pub fn new(services: Services, options: PatcherOptions) -> Self {
        Self {
            services,
            options,
            catalog: None,
            blocking_error: None,
            game_dir: None,
            installed: Selection::new(),
            session: Session::new(),
            machine: AppStateMachine::new(),
            downloads: ProgressBoard::new(),
            installs: ProgressBoard::new(),
            last_verify: None,
            gate: OperationGate::new(),
        }
    }

    /// Share an operation gate with other controllers of the same installation.
    pub fn with_gate(mut self, gate: OperationGate) -> Self {
        self.gate = gate;
        self
    }

    // ========================================================================
    // Startup & Installation Folder
    // ========================================================================

    /// Load the catalog, locate the installation and seed the session.
    ///
    /// A catalog failure is fatal: it is kept as the blocking error and
    /// returned. A missing installation folder is not; the session simply
    /// starts empty until `choose_folder` is called.
    pub async fn startup(&mut self) -> Result<()> {
        info!("Loading module catalog");
        let catalog = match self.services.catalog.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(error = %e, "Catalog could not be loaded");
                self.blocking_error = Some(e.to_string());
                return Err(match e {
                    PatcherError::CatalogUnavailable(_) | PatcherError::CatalogDefect(_) => e,
                    other => PatcherError::catalog_unavailable(other.to_string()),
                });
            }
        };
        info!(modules = catalog.len(), groups = catalog.groups().len(), "Catalog loaded");
        self.catalog = Some(catalog);
        self.blocking_error = None;

        self.game_dir = self.resolve_game_dir();
        match &self.game_dir {
            Some(dir) => info!(path = %dir.display(), "Using installation folder"),
            None => warn!("No installation folder found; choose one before applying"),
        }

        self.refresh_installed().await?;
        self.session = Session::from_installed(&self.installed);
        Ok(())
    }

    fn resolve_game_dir(&self) -> Option<PathBuf> {
        let locator = &self.services.locator;
        if let Some(path) = locator.load_persisted() {
            if locator.is_valid(&path) {
                debug!(path = %path.display(), "Persisted installation folder is valid");
                return Some(path);
            }
            warn!(path = %path.display(), "Persisted installation folder is no longer valid");
        }

        let detected = locator.probe_known()?;
        if let Err(e) = locator.persist(&detected) {
            warn!(error = %e, "Could not remember detected installation folder");
        }
        Some(detected)
    }

    /// Switch to another installation folder.
    ///
    /// With `None` the locator asks the user. The folder is validated,
    /// persisted and re-probed, and the session is reseeded from it.
    pub async fn choose_folder(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        self.ensure_configuring()?;
        let path = match path {
            Some(p) => p,
            None => self
                .services
                .locator
                .select_folder()
                .ok_or(PatcherError::InstallPathUnknown)?,
        };
        if !self.services.locator.is_valid(&path) {
            return Err(PatcherError::InvalidInstallation(path));
        }
        self.services.locator.persist(&path)?;
        info!(path = %path.display(), "Installation folder changed");
        self.game_dir = Some(path.clone());

        self.refresh_installed().await?;
        self.session = Session::from_installed(&self.installed);
        Ok(path)
    }

    /// Re-probe which catalog modules are installed.
    ///
    /// The installed set is replaced only when the probe succeeds.
    pub async fn refresh_installed(&mut self) -> Result<&Selection> {
        let ids: Vec<ModuleId> = self.catalog()?.ids().cloned().collect();
        let Some(dir) = self.game_dir.clone() else {
            self.installed.clear();
            return Ok(&self.installed);
        };
        let found = self.services.probe.detect_installed(&dir, &ids).await?;
        debug!(installed = found.len(), "Installed modules probed");
        self.installed = found;
        Ok(&self.installed)
    }

    // ========================================================================
    // Read Access
    // ========================================================================

    pub fn catalog(&self) -> Result<&Catalog> {
        self.catalog.as_ref().ok_or_else(|| self.catalog_missing())
    }

    fn catalog_missing(&self) -> PatcherError {
        PatcherError::catalog_unavailable(
            self.blocking_error
                .clone()
                .unwrap_or_else(|| "catalog not loaded".to_string()),
        )
    }

    pub fn blocking_error(&self) -> Option<&str> {
        self.blocking_error.as_deref()
    }

    pub fn game_dir(&self) -> Option<&Path> {
        self.game_dir.as_deref()
    }

    pub fn installed(&self) -> &Selection {
        &self.installed
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn selection(&self) -> &Selection {
        self.session.selection()
    }

    pub fn stage(&self) -> AppStage {
        self.machine.current()
    }

    pub fn failures(&self) -> &BTreeMap<ModuleId, String> {
        self.machine.failures()
    }

    pub fn download_snapshot(&self) -> Vec<ProgressRecord> {
        self.downloads.snapshot()
    }

    pub fn install_snapshot(&self) -> Vec<ProgressRecord> {
        self.installs.snapshot()
    }

    pub fn download_board(&self) -> &ProgressBoard {
        &self.downloads
    }

    pub fn install_board(&self) -> &ProgressBoard {
        &self.installs
    }

    pub fn last_verify(&self) -> Option<&BTreeMap<ModuleId, VerifyStatus>> {
        self.last_verify.as_ref()
    }

    pub fn plan(&self) -> WorkPlan {
        plan::plan(self.session.selection(), &self.installed)
    }

    /// Whether the apply trigger is enabled right now.
    pub fn can_apply(&self) -> bool {
        self.catalog.is_some()
            && self
                .machine
                .can_trigger(self.game_dir.is_some(), self.plan().has_changes())
    }

    // ========================================================================
    // Selection
    // ========================================================================

    fn ensure_configuring(&self) -> Result<()> {
        if self.machine.current() != AppStage::Configure {
            return Err(PatcherError::Transition(format!(
                "selection can't change while '{}'",
                self.machine.current()
            )));
        }
        Ok(())
    }

    /// Toggle a module (or its linked group). Returns true if the selection changed.
    pub fn toggle(&mut self, id: &ModuleId) -> Result<bool> {
        self.ensure_configuring()?;
        match &self.catalog {
            Some(catalog) => Ok(self.session.toggle(catalog, id)),
            None => Err(self.catalog_missing()),
        }
    }

    pub fn apply_preset(&mut self, preset: Preset) -> Result<()> {
        self.ensure_configuring()?;
        match &self.catalog {
            Some(catalog) => {
                self.session.apply_preset(catalog, preset);
                Ok(())
            }
            None => Err(self.catalog_missing()),
        }
    }

    /// Replace the selection with saved ids, closed over dependencies and
    /// linked groups.
    pub fn restore_selection(&mut self, ids: &[ModuleId]) -> Result<()> {
        self.ensure_configuring()?;
        match &self.catalog {
            Some(catalog) => {
                self.session.restore(catalog, ids);
                Ok(())
            }
            None => Err(self.catalog_missing()),
        }
    }

    /// Choose a variant. For a module that is already installed the choice
    /// only takes effect once the module is removed and installed again.
    pub fn set_variant(&mut self, id: &ModuleId, index: usize) -> Result<()> {
        self.ensure_configuring()?;
        match &self.catalog {
            Some(catalog) => self.session.set_variant(catalog, id, index)?,
            None => return Err(self.catalog_missing()),
        }
        if self.installed.contains(id) && self.session.is_selected(id) {
            tracing::warn!(
                module = %id,
                variant = index,
                "Module is already installed; the variant change is not applied by this plan"
            );
        }
        Ok(())
    }

    /// Installed, still-selected modules with an explicit variant choice.
    /// The plan compares module sets only, so these are left as they are.
    pub fn unapplied_variant_changes(&self) -> Vec<ModuleId> {
        self.plan()
            .unchanged
            .into_iter()
            .filter(|id| self.session.has_variant_choice(id))
            .collect()
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Converge the installation onto the current selection.
    ///
    /// Uninstalls run before downloads; only successfully downloaded modules
    /// are installed. Per-module failures are recorded and leave the machine
    /// in the phase where they happened. In `Complete` the trigger only
    /// returns to `Configure`.
    pub async fn apply(&mut self) -> Result<ApplyReport> {
        match self.machine.current() {
            AppStage::Complete => {
                self.machine.return_to_configure()?;
                return Ok(ApplyReport::reset());
            }
            AppStage::Configure => {}
            stage => {
                return Err(PatcherError::Transition(format!(
                    "apply is unavailable while '{}'; reset first",
                    stage
                )));
            }
        }

        let catalog = self.catalog()?.clone();
        let game_dir = self.game_dir.clone().ok_or(PatcherError::InstallPathUnknown)?;
        let _guard = self.gate.try_acquire()?;

        let issues = resolver::validate_selection(&catalog, self.session.selection());
        if let Some(first) = issues.into_iter().next() {
            warn!(error = %first, "Refusing to apply an invalid selection");
            return Err(first);
        }

        let work = self.plan();
        info!("{}", work.summary());
        if !work.has_changes() {
            return Ok(ApplyReport::default());
        }

        self.machine.clear_failures();
        self.downloads.reset();
        self.installs.reset();
        let mut report = ApplyReport::default();

        if !work.to_uninstall.is_empty() {
            self.machine.transition_to(AppStage::Uninstalling)?;
            report.removed = self.run_uninstall(&game_dir, &work).await;
        }

        if !work.to_install.is_empty() {
            self.machine.transition_to(AppStage::Downloading)?;
            let ids: Vec<ModuleId> = work.to_install.iter().cloned().collect();
            let options = DownloadOptions {
                dest_dir: self.options.downloads_dir.clone(),
                timeout: self.options.transfer_timeout,
            };
            let outcomes = download::download_all(
                self.services.download.as_ref(),
                &catalog,
                &ids,
                self.session.variants(),
                &options,
                &mut self.downloads,
            )
            .await;

            for outcome in &outcomes {
                if let Err(e) = &outcome.result {
                    self.machine.record_failure(outcome.module.clone(), e.to_string());
                }
            }

            let ready = download::succeeded(&outcomes);
            if !ready.is_empty() {
                self.machine.transition_to(AppStage::Installing)?;
                let batch = install::install_patches(
                    self.services.install.as_ref(),
                    &game_dir,
                    &ready,
                    &mut self.installs,
                )
                .await;
                for (id, reason) in &batch.failed {
                    self.machine.record_failure(id.clone(), reason.clone());
                }
                report.installed = batch.installed;
            }
        }

        if let Err(e) = self.refresh_installed().await {
            warn!(error = %e, "Re-probe after apply failed; keeping previous installed set");
        }

        report.failed = self.machine.failures().clone();
        if report.failed.is_empty() {
            self.machine.transition_to(AppStage::Complete)?;
            report.completed = true;
            info!(
                removed = report.removed.len(),
                installed = report.installed.len(),
                "Apply complete"
            );
        } else {
            warn!(
                failed = report.failed.len(),
                stage = %self.machine.current(),
                "Apply stopped with failures"
            );
        }
        Ok(report)
    }

    /// Best-effort uninstall; a failed id is recorded and left out of the
    /// returned list.
    async fn run_uninstall(&mut self, game_dir: &Path, work: &WorkPlan) -> Vec<ModuleId> {
        let ids: Vec<ModuleId> = work.to_uninstall.iter().cloned().collect();
        info!(modules = ids.len(), "Uninstalling modules");
        match self.services.uninstall.uninstall(game_dir, &ids).await {
            Ok(removed) => {
                for id in ids.iter().filter(|id| !removed.contains(id)) {
                    warn!(module = %id, "Module was not removed");
                    self.machine.record_failure(
                        id.clone(),
                        PatcherError::install(format!("module {} was not removed", id)).to_string(),
                    );
                }
                ids.into_iter().filter(|id| removed.contains(id)).collect()
            }
            Err(e) => {
                error!(error = %e, "Uninstall failed");
                for id in &ids {
                    self.machine.record_failure(id.clone(), e.to_string());
                }
                Vec::new()
            }
        }
    }

    /// Leave a finished or failed run and return to `Configure`.
    pub fn reset(&mut self) -> Result<()> {
        self.machine.return_to_configure()?;
        Ok(())
    }

    // ========================================================================
    // Verify & Repair
    // ========================================================================

    fn maintenance_targets(&self, ids: Option<&[ModuleId]>) -> Result<(PathBuf, Vec<ModuleId>)> {
        self.catalog()?;
        let dir = self.game_dir.clone().ok_or(PatcherError::InstallPathUnknown)?;
        let ids = match ids {
            Some(ids) => ids.to_vec(),
            None => self.session.selection().iter().cloned().collect(),
        };
        Ok((dir, ids))
    }

    /// Verify the current selection (or `ids`). Read-only.
    pub async fn verify(
        &mut self,
        ids: Option<&[ModuleId]>,
    ) -> Result<BTreeMap<ModuleId, VerifyStatus>> {
        let (dir, ids) = self.maintenance_targets(ids)?;
        let results =
            maintenance::verify(&self.gate, self.services.verify.as_ref(), &dir, &ids).await?;
        self.machine.clear_failures();
        for (id, status) in &results {
            if status.needs_repair() {
                self.machine
                    .record_failure(id.clone(), PatcherError::VerifyMismatch(*status).to_string());
            }
        }
        self.last_verify = Some(results.clone());
        Ok(results)
    }

    /// Re-install `ids` through the install protocol, then re-probe.
    pub async fn repair(&mut self, ids: &[ModuleId]) -> Result<Vec<RepairOutcome>> {
        let (dir, ids) = self.maintenance_targets(Some(ids))?;
        self.machine.clear_failures();
        let outcomes = maintenance::repair(
            &self.gate,
            self.services.install.as_ref(),
            &dir,
            &ids,
            &mut self.installs,
        )
        .await?;

        for outcome in outcomes.iter().filter(|o| !o.success) {
            let reason = outcome.error.clone().unwrap_or_else(|| "unknown".to_string());
            self.machine.record_failure(outcome.module.clone(), reason);
        }
        if let Err(e) = self.refresh_installed().await {
            warn!(error = %e, "Re-probe after repair failed");
        }
        Ok(outcomes)
    }

    /// Verify the current selection and repair whatever needs it.
    pub async fn verify_and_repair(&mut self) -> Result<Vec<RepairOutcome>> {
        let results = self.verify(None).await?;
        let broken = maintenance::needing_repair(&results);
        if broken.is_empty() {
            info!("Nothing needs repair");
            return Ok(Vec::new());
        }
        self.repair(&broken).await
    }
}
