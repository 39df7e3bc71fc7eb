//! Object storage on the local filesystem.
//!
//! Objects live under a root directory and are served by whatever static file
//! server fronts that directory; `public_url` joins the configured base URL with
//! the object path.

use super::ObjectStorage;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Filesystem-backed [`ObjectStorage`].
#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    /// Creates a store rooted at `root`, publishing objects under `public_base_url`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves an object path below the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage {
                message: format!("Invalid object path '{path}'"),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn storage_error(path: &str, e: &std::io::Error) -> Error {
    Error::Storage {
        message: format!("{path}: {e}"),
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn store(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(path, &e))?;
        }
        debug!(path, size = bytes.len(), "Storing object");
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| storage_error(path, &e))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| storage_error(path, &e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(path, &e)),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}
