//! Chunked file copy with throttled progress, and the filesystem
//! install/uninstall service built on it.
//!
//! Archives are raw files, so installing a module is copying
//! `Patch-<ID>.mpq` from the downloads folder into the installation's `Data`
//! folder, and uninstalling is deleting it again.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::error::{PatcherError, Result};
use crate::local::detector::data_dir;
use crate::progress::ProgressEvent;
use crate::services::{emit, EventSink, InstallService, UninstallService};
use crate::types::{ModuleId, OperationId};

/// Read buffer for chunked copies (64 KiB)
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Name of the game's client cache, relative to the installation folder
pub const CACHE_DIR_NAME: &str = "WDB";

// ============================================================================
// Progress Tracking
// ============================================================================

/// Counts bytes for one operation and turns them into throttled progress events
#[derive(Debug)]
pub struct ProgressTracker {
    id: OperationId,
    total: u64,
    done: u64,
    /// Bytes already present when the tracker was created (resumed transfers)
    base: u64,
    started: Instant,
    last_report: Option<Instant>,
    interval: Duration,
}

impl ProgressTracker {
    pub fn new(id: OperationId, total: u64, interval: Duration) -> Self {
        Self {
            id,
            total,
            done: 0,
            base: 0,
            started: Instant::now(),
            last_report: None,
            interval,
        }
    }

    /// Count `done` bytes as already transferred. They show in progress but
    /// not in the rate.
    pub fn resume_from(mut self, done: u64) -> Self {
        self.done = done;
        self.base = done;
        self
    }

    /// Add `chunk` bytes. Returns an event if the interval has passed since
    /// the last one (the first update always reports).
    pub fn update(&mut self, chunk: u64) -> Option<ProgressEvent> {
        self.done += chunk;
        let now = Instant::now();
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if !due {
            return None;
        }
        self.last_report = Some(now);
        Some(self.event())
    }

    /// Unthrottled event for the current count.
    pub fn event(&self) -> ProgressEvent {
        let percent = if self.total > 0 {
            (self.done as f64 / self.total as f64 * 100.0).min(100.0) as f32
        } else {
            0.0
        };
        ProgressEvent::Progress {
            id: self.id.clone(),
            done_units: self.done,
            total_units: self.total,
            rate: Some(self.rate()),
            percent,
        }
    }

    /// Average bytes per second since the tracker was created.
    pub fn rate(&self) -> u64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.done.saturating_sub(self.base) as f64 / secs) as u64
        } else {
            0
        }
    }

    pub fn done(&self) -> u64 {
        self.done
    }
}

/// `<dest>.part`, removed when dropped unless committed into place.
///
/// Covers failed copies and copies whose future is dropped mid-way, such as
/// a transfer cut off by a timeout.
#[derive(Debug)]
pub(crate) struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    pub(crate) fn new(dest: &Path) -> Self {
        Self {
            path: partial_path(dest),
            committed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the finished file onto `dest`.
    pub(crate) async fn commit(mut self, dest: &Path) -> Result<()> {
        fs::rename(&self.path, dest).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Could not remove partial file"),
        }
    }
}

/// Copy `source` to `dest` in chunks, reporting through `tracker`.
///
/// Data goes to `<dest>.part` first and is renamed into place once complete,
/// so a failed or abandoned copy never leaves a truncated `dest` behind.
pub async fn copy_with_progress(
    source: &Path,
    dest: &Path,
    tracker: &mut ProgressTracker,
    sink: &EventSink,
) -> Result<u64> {
    let partial = PartialFile::new(dest);
    let bytes = copy_chunks(source, partial.path(), tracker, sink).await?;
    partial.commit(dest).await?;
    Ok(bytes)
}

async fn copy_chunks(
    source: &Path,
    dest: &Path,
    tracker: &mut ProgressTracker,
    sink: &EventSink,
) -> Result<u64> {
    let mut reader = BufReader::new(fs::File::open(source).await?);
    let mut writer = BufWriter::new(fs::File::create(dest).await?);
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        if let Some(event) = tracker.update(read as u64) {
            emit(sink, event);
        }
    }
    writer.flush().await?;

    // Final progress event
    emit(sink, tracker.event());
    Ok(tracker.done())
}

pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Replace the game's cache directory with an empty file of the same name,
/// which keeps the client from rebuilding a stale cache.
pub async fn reset_cache(game_dir: &Path) -> Result<()> {
    let cache = game_dir.join(CACHE_DIR_NAME);
    match fs::metadata(&cache).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&cache).await?,
        Ok(_) => fs::remove_file(&cache).await?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::File::create(&cache).await?;
    tracing::info!(path = %cache.display(), "Game cache reset");
    Ok(())
}

// ============================================================================
// Filesystem Installer
// ============================================================================

/// Installs archives from the downloads folder into `<game>/Data`
#[derive(Debug, Clone)]
pub struct FsInstaller {
    downloads_dir: PathBuf,
    clear_cache: bool,
    progress_interval: Duration,
}

impl FsInstaller {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            clear_cache: true,
            progress_interval: Duration::from_millis(100),
        }
    }

    pub fn with_cache_reset(mut self, enabled: bool) -> Self {
        self.clear_cache = enabled;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    async fn install_one(&self, data: &Path, id: &ModuleId, sink: &EventSink) -> Result<PathBuf> {
        let op = OperationId::from(id);
        let file_name = id.archive_file_name();
        let source = self.downloads_dir.join(&file_name);
        let total = match fs::metadata(&source).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(PatcherError::install(format!(
                    "{} has not been downloaded",
                    file_name
                )));
            }
        };

        emit(
            sink,
            ProgressEvent::Started {
                id: op.clone(),
                display_name: file_name.clone(),
                total_units: total,
            },
        );
        let dest = data.join(&file_name);
        let mut tracker = ProgressTracker::new(op, total, self.progress_interval);
        copy_with_progress(&source, &dest, &mut tracker, sink)
            .await
            .map_err(|e| PatcherError::install(format!("{}: {}", file_name, e)))?;
        Ok(dest)
    }
}

#[async_trait]
impl InstallService for FsInstaller {
    async fn install(
        &self,
        game_dir: &Path,
        ids: &[ModuleId],
        sink: EventSink,
    ) -> Result<Vec<ModuleId>> {
        let data = data_dir(game_dir);
        if !data.is_dir() {
            return Err(PatcherError::InvalidInstallation(game_dir.to_path_buf()));
        }

        if self.clear_cache {
            if let Err(e) = reset_cache(game_dir).await {
                tracing::warn!(error = %e, "Failed to reset game cache");
            }
        }

        let mut installed = Vec::with_capacity(ids.len());
        for id in ids {
            let op = OperationId::from(id);
            match self.install_one(&data, id, &sink).await {
                Ok(dest) => {
                    tracing::info!(module = %id, path = %dest.display(), "Module installed");
                    emit(&sink, ProgressEvent::Completed { id: op });
                    installed.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!(module = %id, error = %e, "Module install failed");
                    emit(&sink, ProgressEvent::failed(op, &e));
                }
            }
        }
        Ok(installed)
    }
}

#[async_trait]
impl UninstallService for FsInstaller {
    async fn uninstall(&self, game_dir: &Path, ids: &[ModuleId]) -> Result<Vec<ModuleId>> {
        let data = data_dir(game_dir);
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let path = data.join(id.archive_file_name());
            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!(module = %id, "Module removed");
                    removed.push(id.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(module = %id, "Module already absent");
                    removed.push(id.clone());
                }
                Err(e) => {
                    tracing::warn!(module = %id, error = %e, "Module could not be removed");
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_first_update_reports() {
        let mut t = ProgressTracker::new(OperationId::from("x"), 200, Duration::from_secs(60));
        let first = t.update(50);
        assert!(matches!(
            first,
            Some(ProgressEvent::Progress { done_units: 50, percent, .. }) if percent == 25.0
        ));
        // Throttled until the interval passes
        assert!(t.update(50).is_none());
        assert_eq!(t.done(), 100);
    }

    #[test]
    fn test_tracker_unknown_total() {
        let t = ProgressTracker::new(OperationId::from("x"), 0, Duration::ZERO);
        assert!(matches!(t.event(), ProgressEvent::Progress { percent, .. } if percent == 0.0));
    }

    #[test]
    fn test_resumed_tracker_starts_from_existing_bytes() {
        let mut t = ProgressTracker::new(OperationId::from("x"), 200, Duration::ZERO).resume_from(150);
        assert!(matches!(
            t.update(50),
            Some(ProgressEvent::Progress { done_units: 200, percent, .. }) if percent == 100.0
        ));
    }

    #[test]
    fn test_uncommitted_partial_is_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("Patch-A.mpq");
        let partial = PartialFile::new(&dest);
        std::fs::write(partial.path(), b"half").unwrap();
        drop(partial);
        assert!(!dir.path().join("Patch-A.mpq.part").exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_committed_partial_lands_on_dest() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("Patch-A.mpq");
        let partial = PartialFile::new(&dest);
        std::fs::write(partial.path(), b"whole").unwrap();
        partial.commit(&dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"whole");
        assert!(!dir.path().join("Patch-A.mpq.part").exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/game/Data/Patch-A.mpq")),
            PathBuf::from("/game/Data/Patch-A.mpq.part")
        );
    }
}
