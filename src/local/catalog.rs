//! Catalog source reading a JSON file.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::catalog::Catalog;
use crate::error::{PatcherError, Result};
use crate::services::CatalogSource;

#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn fetch_catalog(&self) -> Result<Catalog> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PatcherError::catalog_unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        Catalog::from_json(&text)
    }
}
