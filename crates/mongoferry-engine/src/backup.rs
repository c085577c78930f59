//! Backup orchestration
//!
//! A backup is dump, pack, push: dump the database into a staging
//! directory (native `mongodump` when available, driver export
//! otherwise), pack the staging directory into a timestamped tar.gz,
//! then upload it to the requested storage backend. The staging
//! directory lives in a temp dir and disappears whether the backup
//! succeeds or fails.

use mongodb::bson::Document;
use mongoferry_config::Config;
use mongoferry_copy::{connect, export_collection, resolve_collections};
use mongoferry_storage::{open, RemoteFile, StorageUrl};
use mongoferry_tools::{probe, NativeTools};
use mongoferry_types::{
    ArchiveDescriptor, ArchiveName, CollectionSelection, ConnectionEndpoint, Error, Result,
    SafetyBackup, ToolKind,
};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info};

/// Builds backup archives and pushes them to storage
#[derive(Debug, Clone)]
pub struct BackupOrchestrator {
    config: Config,
}

impl BackupOrchestrator {
    /// Create an orchestrator with the given configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Back up a database to a storage destination.
    ///
    /// The returned descriptor carries the archive name, size, and
    /// checksum. For a local destination its path points at the
    /// stored file; for remote destinations the staging copy is gone
    /// by the time this returns.
    pub async fn backup(
        &self,
        source: &ConnectionEndpoint,
        destination: &StorageUrl,
    ) -> Result<ArchiveDescriptor> {
        let backend = open(destination, &self.config);
        backend.test_connection().await?;

        let staging = TempDir::new()?;
        let dump_dir = staging.path().join("dump");
        let database = source.database();

        let tool = self.dump_database(source, &dump_dir).await?;
        let mut descriptor =
            mongoferry_archive::create(&dump_dir, staging.path(), database).await?;

        info!(
            archive = %descriptor.name,
            destination = destination.kind(),
            size = descriptor.size,
            tool = %tool,
            "uploading backup"
        );
        backend.put(&descriptor.path, &descriptor.name).await?;
        if let StorageUrl::Local { path } = destination {
            descriptor.path = path.join(&descriptor.name);
        }
        Ok(descriptor)
    }

    /// Take a safety backup of an endpoint into the configured local
    /// safety directory and verify it before anything may be dropped.
    pub async fn safety_backup(&self, endpoint: &ConnectionEndpoint) -> Result<SafetyBackup> {
        let destination = StorageUrl::Local {
            path: self.config.backup.safety_dir.clone(),
        };
        let descriptor = self.backup(endpoint, &destination).await?;
        SafetyBackup::verified(descriptor)
    }

    /// List the backup archives on a storage destination, newest
    /// first. Files that do not parse as archive names are skipped,
    /// and `database` narrows the list to archives of that database.
    pub async fn list_backups(
        &self,
        destination: &StorageUrl,
        database: Option<&str>,
    ) -> Result<Vec<RemoteFile>> {
        let backend = open(destination, &self.config);
        let mut archives: Vec<RemoteFile> = backend
            .list()
            .await?
            .into_iter()
            .filter(|file| ArchiveName::parse(&file.name).is_ok())
            .filter(|file| {
                database.map_or(true, |db| ArchiveName::matches_database(&file.name, db))
            })
            .collect();
        // Timestamped names sort chronologically; reverse for newest
        // first.
        archives.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(archives)
    }

    /// Dump the database into `dump_dir/<database>/`, choosing the
    /// native tool when present and the driver export otherwise.
    async fn dump_database(
        &self,
        source: &ConnectionEndpoint,
        dump_dir: &Path,
    ) -> Result<ToolKind> {
        let database = source.database();
        let capabilities = probe(self.config.tools.probe_timeout()).await;
        if capabilities.dump_available {
            NativeTools
                .dump(source.uri(), database, None, dump_dir)
                .await?;
            return Ok(ToolKind::Native);
        }

        debug!(database, "mongodump unavailable, using driver export");
        let client = connect(source, self.config.mongo.connect_timeout()).await?;
        let collections =
            resolve_collections(&client, database, &CollectionSelection::All).await?;
        let db_dir = dump_dir.join(database);
        tokio::fs::create_dir_all(&db_dir).await?;
        for name in &collections {
            let collection = client.database(database).collection::<Document>(name);
            export_collection(&collection, &db_dir).await?;
        }
        Ok(ToolKind::Fallback)
    }
}

impl BackupOrchestrator {
    /// Delete a named archive from a storage destination.
    ///
    /// The name must parse as an archive name; arbitrary remote paths
    /// are refused.
    pub async fn delete_backup(&self, destination: &StorageUrl, name: &str) -> Result<()> {
        ArchiveName::parse(name)
            .map_err(|_| Error::validation(format!("'{name}' is not a backup archive name")))?;
        let backend = open(destination, &self.config);
        backend.remove(name).await?;
        info!(archive = name, destination = destination.kind(), "backup deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_backups_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in [
            "20240116-090000-production.tar.gz",
            "20240115-103000-production.tar.gz",
            "20240115-103000-staging.tar.gz",
            "notes.txt",
        ] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }

        let orchestrator = BackupOrchestrator::new(Config::default());
        let destination = StorageUrl::Local {
            path: dir.path().to_path_buf(),
        };

        let all = orchestrator.list_backups(&destination, None).await.unwrap();
        let names: Vec<&str> = all.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "20240116-090000-production.tar.gz",
                "20240115-103000-staging.tar.gz",
                "20240115-103000-production.tar.gz",
            ]
        );

        let production = orchestrator
            .list_backups(&destination, Some("production"))
            .await
            .unwrap();
        assert_eq!(production.len(), 2);
        assert!(production.iter().all(|f| f.name.ends_with("-production.tar.gz")));
    }

    #[tokio::test]
    async fn delete_refuses_non_archive_names() {
        let dir = TempDir::new().unwrap();
        let orchestrator = BackupOrchestrator::new(Config::default());
        let destination = StorageUrl::Local {
            path: dir.path().to_path_buf(),
        };
        let err = orchestrator
            .delete_backup(&destination, "../etc/passwd")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), mongoferry_types::ErrorKind::Validation);
    }
}
