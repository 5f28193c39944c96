//! Transfers from a local mirror.
//!
//! Links that point at the filesystem (`file://` URLs, absolute paths, or
//! paths relative to the configured mirror root) are copied in chunks with
//! throttled progress. Network links belong to `http::HttpTransfer`; given
//! one, the mirror fails with `TransferFailed`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PatcherError, Result};
use crate::local::copier::{copy_with_progress, ProgressTracker};
use crate::progress::ProgressEvent;
use crate::services::{emit, DownloadService, EventSink, TransferRequest};

#[derive(Debug, Clone)]
pub struct MirrorTransfer {
    mirror_root: Option<PathBuf>,
    progress_interval: Duration,
}

impl MirrorTransfer {
    pub fn new(mirror_root: Option<PathBuf>) -> Self {
        Self {
            mirror_root,
            progress_interval: Duration::from_millis(100),
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Map a link URL onto a local file, if it names one.
    pub fn resolve_source(&self, url: &str) -> Option<PathBuf> {
        if let Some(rest) = url.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if url.contains("://") {
            return None;
        }
        let path = Path::new(url);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        self.mirror_root.as_ref().map(|root| root.join(path))
    }
}

#[async_trait]
impl DownloadService for MirrorTransfer {
    async fn transfer(&self, request: TransferRequest, sink: EventSink) -> Result<PathBuf> {
        let source = self.resolve_source(&request.url).ok_or_else(|| {
            PatcherError::transfer(format!(
                "{} link {} can't be fetched from a local mirror",
                request.provider, request.url
            ))
        })?;

        let total = tokio::fs::metadata(&source)
            .await
            .map_err(|e| PatcherError::transfer(format!("{}: {}", source.display(), e)))?
            .len();

        let file_name = match &request.target_file_name {
            Some(name) => name.clone(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PatcherError::transfer(format!("{} has no file name", source.display())))?,
        };
        tokio::fs::create_dir_all(&request.dest_dir).await?;
        let dest = request.dest_dir.join(file_name);

        tracing::debug!(
            module = %request.module,
            source = %source.display(),
            dest = %dest.display(),
            "Copying from mirror"
        );
        emit(
            &sink,
            ProgressEvent::Started {
                id: request.id.clone(),
                display_name: request.display_name.clone(),
                total_units: total,
            },
        );

        let mut tracker = ProgressTracker::new(request.id.clone(), total, self.progress_interval);
        copy_with_progress(&source, &dest, &mut tracker, &sink)
            .await
            .map_err(|e| PatcherError::transfer(e.to_string()))?;
        Ok(dest)
    }
}
