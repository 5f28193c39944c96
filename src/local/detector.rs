//! Game installation detection.
//!
//! # Design
//!
//! - **Cheap checks only**: a folder is an installation when it holds a known
//!   game executable and a `Data` directory; nothing is opened or parsed
//! - **Auto-detect order**: current directory, then the executable's directory
//! - **Installed = present**: a module counts as installed when its archive
//!   file exists in `Data`

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::logic::resolver::Selection;
use crate::services::InstallProbe;
use crate::types::ModuleId;

/// Executables that identify a game installation
pub const KNOWN_EXECUTABLES: &[&str] = &["WoW.exe", "WoWFoV.exe", "turtle-wow.exe"];

/// Returns true if `path` holds a known game executable and a `Data` folder.
pub fn is_valid_installation(path: &Path) -> bool {
    let has_exe = KNOWN_EXECUTABLES
        .iter()
        .any(|exe| path.join(exe).is_file());
    has_exe && data_dir(path).is_dir()
}

/// The folder archives are installed into.
pub fn data_dir(game_dir: &Path) -> PathBuf {
    game_dir.join("Data")
}

/// Look for an installation in the current directory, then next to the
/// running executable.
pub fn auto_detect() -> Option<PathBuf> {
    let candidates = [
        std::env::current_dir().ok(),
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf)),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find(|dir| is_valid_installation(dir));
    match &found {
        Some(dir) => tracing::info!(path = %dir.display(), "Detected game installation"),
        None => tracing::debug!("No game installation detected"),
    }
    found
}

/// Probes `Data` for installed archives
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl InstallProbe for FsProbe {
    async fn detect_installed(&self, game_dir: &Path, ids: &[ModuleId]) -> Result<Selection> {
        let data = data_dir(game_dir);
        let mut installed = Selection::new();
        for id in ids {
            let path = data.join(id.archive_file_name());
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {
                    installed.insert(id.clone());
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(installed)
    }
}
