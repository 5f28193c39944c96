//! Size-based verification of installed archives.
//!
//! The downloaded archive is the reference: an installed file is `Ok` when it
//! has the same size as its download.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::local::detector::data_dir;
use crate::services::VerifyService;
use crate::types::{ModuleId, VerifyStatus};

#[derive(Debug, Clone)]
pub struct FsVerifier {
    downloads_dir: PathBuf,
}

impl FsVerifier {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
        }
    }

    async fn verify_one(&self, data: &Path, id: &ModuleId) -> Result<VerifyStatus> {
        let name = id.archive_file_name();
        let Some(installed) = file_size(&data.join(&name)).await? else {
            return Ok(VerifyStatus::Missing);
        };
        let Some(reference) = file_size(&self.downloads_dir.join(&name)).await? else {
            return Ok(VerifyStatus::NoReference);
        };
        if installed != reference {
            tracing::debug!(module = %id, installed, reference, "Size mismatch");
            return Ok(VerifyStatus::SizeMismatch);
        }
        Ok(VerifyStatus::Ok)
    }
}

async fn file_size(path: &Path) -> Result<Option<u64>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl VerifyService for FsVerifier {
    async fn verify(
        &self,
        game_dir: &Path,
        ids: &[ModuleId],
    ) -> Result<BTreeMap<ModuleId, VerifyStatus>> {
        let data = data_dir(game_dir);
        let mut results = BTreeMap::new();
        for id in ids {
            results.insert(id.clone(), self.verify_one(&data, id).await?);
        }
        Ok(results)
    }
}
