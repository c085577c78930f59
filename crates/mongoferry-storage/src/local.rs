//! Local filesystem storage backend

use crate::{RemoteFile, StorageBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongoferry_types::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores archives in a directory on the local filesystem.
///
/// The directory is created on first use. This is also the backend
/// safety backups land on before a destructive operation.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `dir`
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory the backend stores files in
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target(&self, remote_name: &str) -> PathBuf {
        self.dir.join(remote_name)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn test_connection(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::storage_connection("local", e.to_string()))?;
        // A directory we cannot write into is as good as unreachable.
        let probe = self.dir.join(".mongoferry-probe");
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| Error::storage_connection("local", e.to_string()))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| Error::storage_connection("local", e.to_string()))?;
        Ok(())
    }

    async fn put(&self, local: &Path, remote_name: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::storage_transfer("local", e.to_string()))?;
        let target = self.target(remote_name);
        debug!(from = %local.display(), to = %target.display(), "copying archive");
        tokio::fs::copy(local, &target)
            .await
            .map_err(|e| Error::storage_transfer("local", e.to_string()))?;
        Ok(())
    }

    async fn get(&self, remote_name: &str, local: &Path) -> Result<()> {
        let source = self.target(remote_name);
        tokio::fs::copy(&source, local).await.map_err(|e| {
            Error::storage_transfer("local", format!("{}: {e}", source.display()))
        })?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::storage_transfer("local", e.to_string()))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_transfer("local", e.to_string()))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| Error::storage_transfer("local", e.to_string()))?;
            if !metadata.is_file() {
                continue;
            }
            files.push(RemoteFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn remove(&self, remote_name: &str) -> Result<()> {
        tokio::fs::remove_file(self.target(remote_name))
            .await
            .map_err(|e| Error::storage_transfer("local", e.to_string()))?;
        Ok(())
    }
}
