//! Restore orchestration
//!
//! The mirror of backup: fetch the archive from its storage backend,
//! extract it in a temp dir, and load the dump into the target
//! database. Restoring into a non-empty database requires the
//! explicit `drop_target` flag; with `auto_backup` also set, the
//! existing data is backed up to the local safety directory before
//! the drop.

use mongodb::bson::Document;
use mongodb::Client;
use mongoferry_config::Config;
use mongoferry_copy::{connect, import_collection};
use mongoferry_storage::{open, StorageUrl};
use mongoferry_tools::{probe, NativeTools, NsMapping};
use mongoferry_types::{
    ArchiveName, ConnectionEndpoint, Error, RestoreOutcome, RestoreSpec, Result, SafetyBackup,
    ToolKind,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Restores backup archives into a live deployment
#[derive(Debug, Clone)]
pub struct RestoreOrchestrator {
    config: Config,
}

impl RestoreOrchestrator {
    /// Create an orchestrator with the given configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Restore an archive from a storage destination.
    ///
    /// # Errors
    ///
    /// Refuses to touch a non-empty target database unless the
    /// restore spec sets `drop_target`; there is no implicit merge.
    pub async fn restore(
        &self,
        spec: RestoreSpec,
        source: &StorageUrl,
    ) -> Result<RestoreOutcome> {
        let target_database = target_database(&spec)?;
        let backend = open(source, &self.config);

        let staging = TempDir::new()?;
        let local_archive = staging.path().join(&spec.archive);
        info!(
            archive = %spec.archive,
            source = source.kind(),
            database = %target_database,
            "fetching archive"
        );
        backend.get(&spec.archive, &local_archive).await?;
        let checksum = mongoferry_archive::sha256_file(&local_archive).await?;
        debug!(archive = %spec.archive, checksum = %checksum, "archive fetched");

        let extract_dir = staging.path().join("extract");
        let dump_root = mongoferry_archive::unpack(&local_archive, &extract_dir).await?;
        let db_dir = locate_database_dump(&dump_root, &spec.archive)?;
        let archived_database = db_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::archive("dump directory has no database name"))?
            .to_string();

        let client = connect(&spec.target, self.config.mongo.connect_timeout()).await?;
        let existing = existing_collections(&client, &target_database).await?;
        if !existing.is_empty() {
            if !spec.drop_target {
                return Err(Error::validation(format!(
                    "target database '{target_database}' is not empty ({} collections); \
                     restore with drop_target or into a different database",
                    existing.len()
                )));
            }
            let backup = if spec.auto_backup {
                Some(self.safety_backup(&spec, &target_database).await?)
            } else {
                None
            };
            self.drop_database(&client, &target_database, backup).await?;
        }

        let tool = self
            .load_dump(&spec, &dump_root, &db_dir, &archived_database, &target_database, &client)
            .await?;

        let outcome = observe_restore(&client, &target_database, &spec.archive, tool).await?;
        info!(
            database = %outcome.database,
            collections = outcome.collections,
            documents = outcome.documents,
            tool = %outcome.tool_used,
            "restore finished"
        );
        Ok(outcome)
    }

    async fn safety_backup(
        &self,
        spec: &RestoreSpec,
        target_database: &str,
    ) -> Result<SafetyBackup> {
        info!(database = target_database, "taking safety backup before drop");
        let endpoint = ConnectionEndpoint::new(spec.target.uri(), target_database);
        crate::BackupOrchestrator::new(self.config.clone())
            .safety_backup(&endpoint)
            .await
    }

    /// Drop the target database. The safety backup parameter exists
    /// so an `auto_backup` drop cannot be sequenced before its backup.
    async fn drop_database(
        &self,
        client: &Client,
        database: &str,
        backup: Option<SafetyBackup>,
    ) -> Result<()> {
        if let Some(backup) = &backup {
            debug!(archive = %backup.archive().name, "drop authorized by safety backup");
        }
        warn!(database, "dropping target database");
        client
            .database(database)
            .drop()
            .await
            .map_err(|e| Error::connectivity(database, format!("drop failed: {e}")))
    }

    /// Load the extracted dump, renaming the archived database onto
    /// the target database when they differ.
    async fn load_dump(
        &self,
        spec: &RestoreSpec,
        dump_root: &Path,
        db_dir: &Path,
        archived_database: &str,
        target_database: &str,
        client: &Client,
    ) -> Result<ToolKind> {
        let capabilities = probe(self.config.tools.probe_timeout()).await;
        if capabilities.restore_available {
            let mapping = NsMapping::database(archived_database, target_database);
            NativeTools
                .restore(spec.target.uri(), dump_root, &mapping, false)
                .await?;
            return Ok(ToolKind::Native);
        }

        debug!(database = target_database, "mongorestore unavailable, using driver import");
        let batch_size = self.config.copy.batch_size;
        let mut entries = tokio::fs::read_dir(db_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bson") {
                continue;
            }
            let collection_name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::archive(format!("unreadable dump file {}", path.display())))?
                .to_string();
            let target = client
                .database(target_database)
                .collection::<Document>(&collection_name);
            import_collection(&path, &target, batch_size).await?;
        }
        Ok(ToolKind::Fallback)
    }
}

/// Resolve which database the restore writes into: the explicit
/// override first, then the database encoded in the archive name.
fn target_database(spec: &RestoreSpec) -> Result<String> {
    if let Some(database) = &spec.target_database {
        return Ok(database.clone());
    }
    ArchiveName::parse(&spec.archive)
        .map(|name| name.database)
        .map_err(|_| {
            Error::validation(format!(
                "cannot infer a target database from '{}'; pass one explicitly",
                spec.archive
            ))
        })
}

/// Find the per-database dump directory under the extracted `dump/`
/// root. Prefers the directory named after the archive; otherwise a
/// single subdirectory is unambiguous.
fn locate_database_dump(dump_root: &Path, archive: &str) -> Result<PathBuf> {
    if let Ok(name) = ArchiveName::parse(archive) {
        let preferred = dump_root.join(&name.database);
        if preferred.is_dir() {
            return Ok(preferred);
        }
    }
    let mut directories: Vec<PathBuf> = std::fs::read_dir(dump_root)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    match directories.len() {
        1 => Ok(directories.remove(0)),
        0 => Err(Error::archive(format!(
            "archive '{archive}' contains no database dump"
        ))),
        n => Err(Error::archive(format!(
            "archive '{archive}' contains {n} database dumps; cannot pick one"
        ))),
    }
}

async fn existing_collections(client: &Client, database: &str) -> Result<Vec<String>> {
    let mut names = client
        .database(database)
        .list_collection_names()
        .await
        .map_err(|e| Error::connectivity(database, e.to_string()))?;
    names.retain(|name| !name.starts_with("system."));
    Ok(names)
}

async fn observe_restore(
    client: &Client,
    database: &str,
    archive: &str,
    tool: ToolKind,
) -> Result<RestoreOutcome> {
    let collections = existing_collections(client, database).await?;
    let mut documents: u64 = 0;
    for name in &collections {
        documents += client
            .database(database)
            .collection::<Document>(name)
            .estimated_document_count()
            .await
            .map_err(|e| Error::connectivity(name.clone(), e.to_string()))?;
    }
    Ok(RestoreOutcome {
        database: database.to_string(),
        collections: collections.len() as u32,
        documents,
        source_archive: archive.to_string(),
        tool_used: tool,
    })
}
