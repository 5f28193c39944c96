//! In-memory collaborators shared by the integration tests.
//!
//! The fakes share one installed set, so installs and uninstalls performed
//! through them show up on the next probe.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hdpatcher::app::{Patcher, PatcherOptions};
use hdpatcher::catalog::{Catalog, DownloadLink, Group, Module};
use hdpatcher::error::{PatcherError, Result};
use hdpatcher::logic::resolver::Selection;
use hdpatcher::progress::ProgressEvent;
use hdpatcher::services::{
    emit, CatalogSource, DownloadService, EventSink, InstallProbe, InstallService,
    InstallationLocator, Services, TransferRequest, UninstallService, VerifyService,
};
use hdpatcher::types::{ModuleId, OperationId, Provider, VerifyStatus};

pub fn ids(list: &[&str]) -> Selection {
    list.iter().map(|s| ModuleId::from(*s)).collect()
}

pub fn id(s: &str) -> ModuleId {
    ModuleId::from(s)
}

fn linked(name: &str) -> DownloadLink {
    DownloadLink::new(Provider::Direct, format!("mirror/{}", name))
}

/// Catalog shaped like the real one: core visuals, a linked environment
/// pack, audio, and two character extras that need A and G.
pub fn sample_catalog() -> Catalog {
    let plain = |m: &str, name: &str| Module::new(m, name).with_link(linked(&format!("Patch-{}.mpq", m)));
    let modules = vec![
        plain("A", "Player Characters"),
        plain("B", "Buildings"),
        plain("C", "Creatures"),
        plain("D", "Doodads"),
        plain("E", "Environment"),
        plain("G", "Gameplay Elements"),
        plain("I", "Interface"),
        plain("M", "Maps"),
        plain("S", "Sounds"),
        plain("V", "Visual Effects"),
        plain("N", "Darker Nights"),
        plain("U", "Ultra Characters").with_dependencies(["A", "G"]),
        Module::new("L", "A Little Extra")
            .with_dependencies(["A", "G"])
            .with_variants(["Regular Version", "Less Thicc Version"])
            .with_link(linked("regular/Patch-L.mpq"))
            .with_link(linked("slim/Patch-L.mpq")),
        plain("Q", "Alt HD Environment").with_conflicts(["E"]),
    ];
    let groups = vec![
        group("Core Visuals", &["A", "C", "G", "I", "M", "V"], false),
        group("Environment Pack", &["B", "D", "E"], true),
        group("Audio", &["S", "N"], false),
        group("Character Extras", &["L", "U"], false),
    ];
    Catalog::new(modules, groups).expect("sample catalog is valid")
}

pub fn group(name: &str, members: &[&str], linked: bool) -> Group {
    Group {
        name: name.to_string(),
        description: String::new(),
        ids: members.iter().map(|m| ModuleId::from(*m)).collect(),
        linked,
    }
}

pub type Shared<T> = Arc<Mutex<T>>;

// ============================================================================
// Fakes
// ============================================================================

pub struct StaticCatalog(pub Option<Catalog>);

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch_catalog(&self) -> Result<Catalog> {
        self.0
            .clone()
            .ok_or_else(|| PatcherError::catalog_unavailable("server unreachable"))
    }
}

pub struct MemoryProbe {
    pub installed: Shared<Selection>,
}

#[async_trait]
impl InstallProbe for MemoryProbe {
    async fn detect_installed(&self, _game_dir: &Path, ids: &[ModuleId]) -> Result<Selection> {
        let installed = self.installed.lock().unwrap();
        Ok(ids.iter().filter(|id| installed.contains(*id)).cloned().collect())
    }
}

/// Download fake with per-module scripted behaviour.
#[derive(Default)]
pub struct ScriptedDownload {
    pub fail: BTreeSet<ModuleId>,
    /// Never finish
    pub hang: BTreeSet<ModuleId>,
    /// Emit a second `Started` for an id outside the run
    pub stray_event: bool,
    pub requests: Mutex<Vec<TransferRequest>>,
}

#[async_trait]
impl DownloadService for ScriptedDownload {
    async fn transfer(&self, request: TransferRequest, sink: EventSink) -> Result<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        emit(
            &sink,
            ProgressEvent::Started {
                id: request.id.clone(),
                display_name: request.display_name.clone(),
                total_units: 100,
            },
        );
        tokio::task::yield_now().await;
        emit(
            &sink,
            ProgressEvent::Progress {
                id: request.id.clone(),
                done_units: 50,
                total_units: 100,
                rate: Some(10),
                percent: 50.0,
            },
        );
        if self.stray_event {
            emit(
                &sink,
                ProgressEvent::Started {
                    id: OperationId::from("stray"),
                    display_name: "stray".to_string(),
                    total_units: 1,
                },
            );
        }
        tokio::task::yield_now().await;

        if self.hang.contains(&request.module) {
            std::future::pending::<()>().await;
        }
        if self.fail.contains(&request.module) {
            return Err(PatcherError::transfer(format!("{} link is dead", request.provider)));
        }
        let name = request
            .target_file_name
            .unwrap_or_else(|| request.module.archive_file_name());
        Ok(request.dest_dir.join(name))
    }
}

impl ScriptedDownload {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail: ids.iter().map(|s| ModuleId::from(*s)).collect(),
            ..Self::default()
        }
    }

    pub fn urls(&self) -> BTreeMap<ModuleId, String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.module.clone(), r.url.clone()))
            .collect()
    }
}

/// Install fake writing into the shared installed set.
pub struct FakeInstall {
    pub installed: Shared<Selection>,
    pub fail: BTreeSet<ModuleId>,
    /// Started but neither returned nor terminated
    pub omit: BTreeSet<ModuleId>,
    /// Reported completed on the stream but left out of the returned list
    pub unreturned: BTreeSet<ModuleId>,
    pub batch_error: bool,
    pub calls: Mutex<Vec<Vec<ModuleId>>>,
}

#[async_trait]
impl InstallService for FakeInstall {
    async fn install(
        &self,
        _game_dir: &Path,
        ids: &[ModuleId],
        sink: EventSink,
    ) -> Result<Vec<ModuleId>> {
        self.calls.lock().unwrap().push(ids.to_vec());
        if self.batch_error {
            return Err(PatcherError::install("Data folder is read-only"));
        }
        let mut done = Vec::new();
        for id in ids {
            let op = OperationId::from(id);
            emit(
                &sink,
                ProgressEvent::Started {
                    id: op.clone(),
                    display_name: id.to_string(),
                    total_units: 10,
                },
            );
            tokio::task::yield_now().await;
            if self.omit.contains(id) {
                continue;
            }
            if self.fail.contains(id) {
                emit(
                    &sink,
                    ProgressEvent::failed(op, &PatcherError::install(format!("{} is corrupt", id))),
                );
                continue;
            }
            self.installed.lock().unwrap().insert(id.clone());
            emit(&sink, ProgressEvent::Completed { id: op });
            if !self.unreturned.contains(id) {
                done.push(id.clone());
            }
        }
        Ok(done)
    }
}

pub struct FakeUninstall {
    pub installed: Shared<Selection>,
    pub fail: BTreeSet<ModuleId>,
}

#[async_trait]
impl UninstallService for FakeUninstall {
    async fn uninstall(&self, _game_dir: &Path, ids: &[ModuleId]) -> Result<Vec<ModuleId>> {
        let mut installed = self.installed.lock().unwrap();
        let mut removed = Vec::new();
        for id in ids {
            if self.fail.contains(id) {
                continue;
            }
            installed.remove(id);
            removed.push(id.clone());
        }
        Ok(removed)
    }
}

pub struct FakeVerify {
    pub results: BTreeMap<ModuleId, VerifyStatus>,
}

#[async_trait]
impl VerifyService for FakeVerify {
    async fn verify(
        &self,
        _game_dir: &Path,
        ids: &[ModuleId],
    ) -> Result<BTreeMap<ModuleId, VerifyStatus>> {
        Ok(ids
            .iter()
            .map(|id| {
                let status = self.results.get(id).copied().unwrap_or(VerifyStatus::Ok);
                (id.clone(), status)
            })
            .collect())
    }
}

pub struct FakeLocator {
    pub persisted: Mutex<Option<PathBuf>>,
    pub known: Option<PathBuf>,
    pub chosen: Option<PathBuf>,
    pub valid: BTreeSet<PathBuf>,
}

impl InstallationLocator for FakeLocator {
    fn select_folder(&self) -> Option<PathBuf> {
        self.chosen.clone()
    }

    fn probe_known(&self) -> Option<PathBuf> {
        self.known.clone()
    }

    fn load_persisted(&self) -> Option<PathBuf> {
        self.persisted.lock().unwrap().clone()
    }

    fn persist(&self, path: &Path) -> Result<()> {
        *self.persisted.lock().unwrap() = Some(path.to_path_buf());
        Ok(())
    }

    fn is_valid(&self, path: &Path) -> bool {
        self.valid.contains(path)
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub const GAME_DIR: &str = "/games/turtle";

/// Knobs for building a `Patcher` over the fakes
pub struct Fixture {
    pub catalog: Option<Catalog>,
    pub installed: Shared<Selection>,
    pub download: Arc<ScriptedDownload>,
    pub install_fail: BTreeSet<ModuleId>,
    pub install_omit: BTreeSet<ModuleId>,
    pub install_unreturned: BTreeSet<ModuleId>,
    pub install_batch_error: bool,
    pub uninstall_fail: BTreeSet<ModuleId>,
    pub verify: BTreeMap<ModuleId, VerifyStatus>,
    pub known_dir: Option<PathBuf>,
    pub options: PatcherOptions,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            catalog: Some(sample_catalog()),
            installed: Arc::new(Mutex::new(Selection::new())),
            download: Arc::new(ScriptedDownload::default()),
            install_fail: BTreeSet::new(),
            install_omit: BTreeSet::new(),
            install_unreturned: BTreeSet::new(),
            install_batch_error: false,
            uninstall_fail: BTreeSet::new(),
            verify: BTreeMap::new(),
            known_dir: Some(PathBuf::from(GAME_DIR)),
            options: PatcherOptions::new("/tmp/hdpatcher-test-downloads"),
        }
    }
}

/// Built fixture: the controller plus handles on the fakes
pub struct Harness {
    pub patcher: Patcher,
    pub installed: Shared<Selection>,
    pub download: Arc<ScriptedDownload>,
    pub install: Arc<FakeInstall>,
    pub locator: Arc<FakeLocator>,
}

impl Fixture {
    pub fn with_installed(self, list: &[&str]) -> Self {
        *self.installed.lock().unwrap() = ids(list);
        self
    }

    pub fn with_download(mut self, download: ScriptedDownload) -> Self {
        self.download = Arc::new(download);
        self
    }

    pub fn build(self) -> Harness {
        let install = Arc::new(FakeInstall {
            installed: self.installed.clone(),
            fail: self.install_fail,
            omit: self.install_omit,
            unreturned: self.install_unreturned,
            batch_error: self.install_batch_error,
            calls: Mutex::new(Vec::new()),
        });
        let valid: BTreeSet<PathBuf> = [PathBuf::from(GAME_DIR), PathBuf::from("/games/other")]
            .into_iter()
            .collect();
        let locator = Arc::new(FakeLocator {
            persisted: Mutex::new(None),
            known: self.known_dir,
            chosen: None,
            valid,
        });
        let services = Services {
            catalog: Arc::new(StaticCatalog(self.catalog)),
            probe: Arc::new(MemoryProbe {
                installed: self.installed.clone(),
            }),
            download: self.download.clone(),
            install: install.clone(),
            uninstall: Arc::new(FakeUninstall {
                installed: self.installed.clone(),
                fail: self.uninstall_fail,
            }),
            verify: Arc::new(FakeVerify {
                results: self.verify,
            }),
            locator: locator.clone(),
        };
        Harness {
            patcher: Patcher::new(services, self.options),
            installed: self.installed,
            download: self.download,
            install,
            locator,
        }
    }
}

impl Harness {
    pub fn installed_now(&self) -> Selection {
        self.installed.lock().unwrap().clone()
    }
}
