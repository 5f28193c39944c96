//! Filesystem-backed collaborators used by the command-line frontend.
//!
//! # Modules
//!
//! - `catalog` - Catalog read from a JSON file
//! - `detector` - Installation validation, auto-detection, installed-set probe
//! - `settings` - Persisted settings and the installation locator
//! - `mirror` - Transfers from a local mirror directory
//! - `http` - HTTP downloads with provider resolution and resume
//! - `copier` - Chunked copy, cache reset, install/uninstall
//! - `verifier` - Size-based verification

pub mod catalog;
pub mod copier;
pub mod detector;
pub mod http;
pub mod mirror;
pub mod settings;
pub mod verifier;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config_file::PatcherConfig;
use crate::error::Result;
use crate::services::{DownloadService, EventSink, Services, TransferRequest};

/// Sends links that name a local file to the mirror and everything else
/// over HTTP.
#[derive(Debug, Clone)]
pub struct LinkRouter {
    mirror: mirror::MirrorTransfer,
    http: http::HttpTransfer,
}

impl LinkRouter {
    pub fn new(mirror: mirror::MirrorTransfer, http: http::HttpTransfer) -> Self {
        Self { mirror, http }
    }

    pub fn is_local(&self, url: &str) -> bool {
        self.mirror.resolve_source(url).is_some()
    }
}

#[async_trait]
impl DownloadService for LinkRouter {
    async fn transfer(&self, request: TransferRequest, sink: EventSink) -> Result<PathBuf> {
        if self.is_local(&request.url) {
            self.mirror.transfer(request, sink).await
        } else {
            self.http.transfer(request, sink).await
        }
    }
}

/// Wire every local collaborator from the configuration.
///
/// `chosen_dir` is the installation folder given on the command line, if any.
pub fn services_from_config(config: &PatcherConfig, chosen_dir: Option<PathBuf>) -> Result<Services> {
    let installer = Arc::new(
        copier::FsInstaller::new(&config.downloads_dir)
            .with_cache_reset(config.clear_cache_on_install)
            .with_progress_interval(config.progress_interval()),
    );
    let locator = settings::FsLocator::new(settings::SettingsStore::new(&config.settings_path))
        .with_choice(chosen_dir);
    let download = LinkRouter::new(
        mirror::MirrorTransfer::new(config.mirror_root.clone())
            .with_progress_interval(config.progress_interval()),
        http::HttpTransfer::new()?.with_progress_interval(config.progress_interval()),
    );

    Ok(Services {
        catalog: Arc::new(catalog::FileCatalog::new(&config.catalog_path)),
        probe: Arc::new(detector::FsProbe),
        download: Arc::new(download),
        install: installer.clone(),
        uninstall: installer,
        verify: Arc::new(verifier::FsVerifier::new(&config.downloads_dir)),
        locator: Arc::new(locator),
    })
}
