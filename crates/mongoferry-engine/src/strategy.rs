//! Copy execution strategy
//!
//! One entry point, [`CopyStrategy::execute`], runs a whole copy:
//! validation, connection, collection resolution, tool selection,
//! optional safety backup and drop, the copy itself, and optional
//! verification. Tool selection prefers the native executables and
//! falls back to the driver copier, recording the reason as a warning
//! on the result rather than failing.

use crate::backup::BackupOrchestrator;
use futures::stream::TryStreamExt;
use mongodb::bson::Document;
use mongodb::{Client, Collection};
use mongoferry_config::Config;
use mongoferry_copy::{connect, resolve_collections, DocumentCopier, IntegrityVerifier, ProgressSender};
use mongoferry_tools::{probe, NativeTools, NsMapping};
use mongoferry_types::{
    CollectionCopyReport, CollectionSelection, CopyResult, CopySpec, Error, Result, SafetyBackup,
    ToolKind,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executes copy specifications
#[derive(Debug, Clone)]
pub struct CopyStrategy {
    config: Config,
    progress: Option<ProgressSender>,
}

impl CopyStrategy {
    /// Create a strategy with the given configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Attach an advisory progress channel for the driver copier
    #[must_use]
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run one copy operation end to end.
    ///
    /// # Errors
    ///
    /// Fails fast on an invalid spec or an unreachable endpoint; a
    /// failure mid-copy propagates immediately and leaves already
    /// copied collections in place.
    pub async fn execute(&self, spec: CopySpec) -> Result<CopyResult> {
        spec.validate()?;
        let started = Instant::now();

        let timeout = self.config.mongo.connect_timeout();
        let source_client = connect(&spec.source, timeout).await?;
        let target_client = connect(&spec.target, timeout).await?;
        let collections =
            resolve_collections(&source_client, spec.source.database(), &spec.selection).await?;

        let capabilities = probe(self.config.tools.probe_timeout()).await;
        let (tool, warnings) = choose_tool(&spec, capabilities.native_path_available());
        info!(
            source = %spec.source.redacted(),
            target = %spec.target.redacted(),
            collections = collections.len(),
            tool = %tool,
            dry_run = spec.dry_run,
            "copy planned"
        );

        if spec.dry_run {
            return Ok(dry_run_result(&collections, tool, warnings, started));
        }

        let mut result = CopyResult {
            collections: Vec::new(),
            elapsed: started.elapsed(),
            tool_used: tool,
            dry_run: false,
            warnings,
            verification: Vec::new(),
        };

        if spec.drop_target {
            let backup = if spec.auto_backup {
                Some(self.safety_backup(&spec).await?)
            } else {
                result.warn("target dropped without a safety backup");
                None
            };
            self.drop_targets(&target_client, &spec, &collections, backup)
                .await?;
        }

        match tool {
            ToolKind::Native => {
                self.native_copy(&spec, &collections).await?;
                // The native tools do not report per-collection
                // counts; read them back from the target.
                for name in &collections {
                    let target = self.target_collection(&target_client, &spec, name);
                    result.collections.push(observe_collection(&target).await?);
                }
            }
            ToolKind::Fallback => {
                let copier = DocumentCopier::new(
                    spec.batch_size.unwrap_or(self.config.copy.batch_size),
                );
                for name in &collections {
                    let source = source_collection(&source_client, &spec, name);
                    let target = self.target_collection(&target_client, &spec, name);
                    let outcome = copier
                        .copy(&source, &target, self.progress.as_ref())
                        .await?;
                    result.collections.push(CollectionCopyReport {
                        collection: target.name().to_string(),
                        documents: outcome.documents,
                        indexes: outcome.indexes,
                    });
                }
            }
        }

        if spec.verify {
            let verifier = IntegrityVerifier::new(
                self.config.verify.sample_size,
                self.config.verify.checksum_threshold,
            );
            for name in &collections {
                let source = source_collection(&source_client, &spec, name);
                let target = self.target_collection(&target_client, &spec, name);
                let report = verifier.verify(&source, &target).await?;
                if !report.overall_match() {
                    result.warn(report.summary());
                }
                result.verification.push(report);
            }
        }

        result.elapsed = started.elapsed();
        info!(
            documents = result.documents_copied(),
            indexes = result.indexes_copied(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "copy finished"
        );
        Ok(result)
    }

    async fn safety_backup(&self, spec: &CopySpec) -> Result<SafetyBackup> {
        info!(target = %spec.target.redacted(), "taking safety backup before drop");
        BackupOrchestrator::new(self.config.clone())
            .safety_backup(&spec.target)
            .await
    }

    /// Drop the target collections a copy is about to overwrite.
    ///
    /// Takes the safety backup by value so that with `auto_backup` set
    /// the drop cannot be reached before the backup exists.
    async fn drop_targets(
        &self,
        target_client: &Client,
        spec: &CopySpec,
        collections: &[String],
        backup: Option<SafetyBackup>,
    ) -> Result<()> {
        if let Some(backup) = &backup {
            debug!(archive = %backup.archive().name, "drop authorized by safety backup");
        }
        for name in collections {
            let target = self.target_collection(target_client, spec, name);
            warn!(collection = %target.name(), "dropping target collection");
            target
                .drop()
                .await
                .map_err(|e| Error::copy(target.name(), 0, format!("drop failed: {e}")))?;
        }
        Ok(())
    }

    async fn native_copy(&self, spec: &CopySpec, collections: &[String]) -> Result<()> {
        let tools = NativeTools;
        match &spec.selection {
            CollectionSelection::One(name) => {
                let target_name = spec.target.collection().unwrap_or(name);
                let mapping = NsMapping::collection(
                    spec.source.database(),
                    name,
                    spec.target.database(),
                    target_name,
                );
                tools
                    .pipe_copy(
                        spec.source.uri(),
                        spec.source.database(),
                        Some(name),
                        spec.target.uri(),
                        &mapping,
                    )
                    .await
            }
            CollectionSelection::All => {
                let mapping =
                    NsMapping::database(spec.source.database(), spec.target.database());
                tools
                    .pipe_copy(
                        spec.source.uri(),
                        spec.source.database(),
                        None,
                        spec.target.uri(),
                        &mapping,
                    )
                    .await
            }
            CollectionSelection::Many(_) => {
                // choose_tool never selects the native path for an
                // explicit list.
                let _ = collections;
                Err(Error::validation(
                    "explicit collection lists cannot run through the native tools",
                ))
            }
        }
    }

    fn target_collection(
        &self,
        client: &Client,
        spec: &CopySpec,
        source_name: &str,
    ) -> Collection<Document> {
        client
            .database(spec.target.database())
            .collection(target_name(spec, source_name))
    }
}

/// Plan report for a dry run: the collections that would be copied,
/// zero documents, zero indexes. Mutates nothing.
fn dry_run_result(
    collections: &[String],
    tool: ToolKind,
    warnings: Vec<String>,
    started: Instant,
) -> CopyResult {
    CopyResult {
        collections: collections
            .iter()
            .map(|name| CollectionCopyReport {
                collection: name.clone(),
                documents: 0,
                indexes: 0,
            })
            .collect(),
        elapsed: started.elapsed(),
        tool_used: tool,
        dry_run: true,
        warnings,
        verification: Vec::new(),
    }
}

/// Decide which physical path runs this copy, with human-readable
/// reasons for every forced fallback.
fn choose_tool(spec: &CopySpec, native_available: bool) -> (ToolKind, Vec<String>) {
    let mut warnings = Vec::new();
    if spec.force_fallback {
        warnings.push("driver copy forced by caller".to_string());
        return (ToolKind::Fallback, warnings);
    }
    if !spec.selection.is_native_expressible() {
        warnings.push("explicit collection list requires the driver copier".to_string());
        return (ToolKind::Fallback, warnings);
    }
    if !native_available {
        warnings.push("native tools unavailable; using driver copier".to_string());
        return (ToolKind::Fallback, warnings);
    }
    (ToolKind::Native, warnings)
}

fn source_collection(client: &Client, spec: &CopySpec, name: &str) -> Collection<Document> {
    client.database(spec.source.database()).collection(name)
}

/// Target collection name for a given source collection. A single
/// collection copy may rename via the target endpoint; everything else
/// keeps the source name.
fn target_name<'a>(spec: &'a CopySpec, source_name: &'a str) -> &'a str {
    match (&spec.selection, spec.target.collection()) {
        (CollectionSelection::One(_), Some(renamed)) => renamed,
        _ => source_name,
    }
}

/// Count documents and secondary indexes on a freshly written
/// collection.
async fn observe_collection(collection: &Collection<Document>) -> Result<CollectionCopyReport> {
    let name = collection.name().to_string();
    let documents = collection
        .count_documents(mongodb::bson::doc! {})
        .await
        .map_err(|e| Error::connectivity(name.clone(), e.to_string()))?;

    let mut cursor = collection
        .list_indexes()
        .await
        .map_err(|e| Error::connectivity(name.clone(), e.to_string()))?;
    let mut indexes: u32 = 0;
    while let Some(index) = cursor
        .try_next()
        .await
        .map_err(|e| Error::connectivity(name.clone(), e.to_string()))?
    {
        let is_id = index
            .options
            .as_ref()
            .and_then(|o| o.name.as_deref())
            .is_some_and(|n| n == "_id_");
        if !is_id {
            indexes += 1;
        }
    }
    Ok(CollectionCopyReport {
        collection: name,
        documents,
        indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongoferry_types::ConnectionEndpoint;

    fn spec(selection: CollectionSelection) -> CopySpec {
        CopySpec::new(
            ConnectionEndpoint::new("mongodb://a.example.com/src", "src"),
            ConnectionEndpoint::new("mongodb://b.example.com/dst", "dst"),
            selection,
        )
    }

    #[test]
    fn native_preferred_when_available() {
        let (tool, warnings) = choose_tool(&spec(CollectionSelection::All), true);
        assert_eq!(tool, ToolKind::Native);
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_tools_force_fallback_with_warning() {
        let (tool, warnings) = choose_tool(&spec(CollectionSelection::All), false);
        assert_eq!(tool, ToolKind::Fallback);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("native tools unavailable"));
    }

    #[test]
    fn caller_can_force_fallback() {
        let (tool, warnings) = choose_tool(&spec(CollectionSelection::All).force_fallback(true), true);
        assert_eq!(tool, ToolKind::Fallback);
        assert!(warnings[0].contains("forced"));
    }

    #[test]
    fn explicit_list_forces_fallback_even_with_tools() {
        let selection = CollectionSelection::Many(vec!["users".into(), "orders".into()]);
        let (tool, warnings) = choose_tool(&spec(selection), true);
        assert_eq!(tool, ToolKind::Fallback);
        assert!(warnings[0].contains("collection list"));
    }

    #[test]
    fn dry_run_reports_zero_documents() {
        let collections = vec!["users".to_string(), "orders".to_string()];
        let result = dry_run_result(
            &collections,
            ToolKind::Native,
            vec![],
            Instant::now(),
        );
        assert!(result.dry_run);
        assert_eq!(result.documents_copied(), 0);
        assert_eq!(result.indexes_copied(), 0);
        let names: Vec<&str> = result
            .collections
            .iter()
            .map(|c| c.collection.as_str())
            .collect();
        assert_eq!(names, vec!["users", "orders"]);
    }

    #[test]
    fn single_collection_copy_can_rename() {
        let mut s = spec(CollectionSelection::One("users".into()));
        s.target = s.target.with_collection("users_copy");
        assert_eq!(target_name(&s, "users"), "users_copy");

        let s = spec(CollectionSelection::All);
        assert_eq!(target_name(&s, "users"), "users");
    }
}
