//! Batched document copy with index re-creation

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Collection, IndexModel};
use mongoferry_types::{Error, ProgressEvent, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Advisory progress channel. The copier never blocks on it and never
/// cares whether anyone is listening.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Outcome of one collection copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Documents written (or confirmed already present) on the target
    pub documents: u64,
    /// Secondary indexes re-created on the target
    pub indexes: u32,
}

/// Driver-level collection copier.
///
/// Streams the source in fixed-size batches and writes each batch with
/// an ordered bulk insert. A duplicate key is tolerated if and only if
/// the target already holds a byte-identical document (idempotent
/// re-run); any other conflict surfaces as a copy error naming the
/// collection and batch. Index re-creation always follows full
/// document insertion.
#[derive(Debug, Clone, Copy)]
pub struct DocumentCopier {
    batch_size: u32,
}

impl DocumentCopier {
    /// Create a copier with the given batch size
    pub fn new(batch_size: u32) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Copy all documents and secondary indexes from `source` to
    /// `target`.
    pub async fn copy(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
        progress: Option<&ProgressSender>,
    ) -> Result<CopyOutcome> {
        let collection = source.name().to_string();
        let total = source
            .estimated_document_count()
            .await
            .map_err(|e| Error::connectivity(collection.clone(), e.to_string()))?;
        info!(collection = %collection, total, "starting driver copy");

        let mut cursor = source
            .find(doc! {})
            .await
            .map_err(|e| Error::copy(&collection, 0, format!("failed to open cursor: {e}")))?;

        let mut batch: Vec<Document> = Vec::with_capacity(self.batch_size as usize);
        let mut batch_index: u64 = 0;
        let mut copied: u64 = 0;

        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|e| Error::copy(&collection, batch_index, format!("cursor read failed: {e}")))?
        {
            batch.push(document);
            if batch.len() >= self.batch_size as usize {
                copied += self.write_batch(target, &collection, &batch, batch_index).await?;
                batch.clear();
                batch_index += 1;
                emit(progress, copied, total);
            }
        }
        if !batch.is_empty() {
            copied += self.write_batch(target, &collection, &batch, batch_index).await?;
            emit(progress, copied, total);
        }

        // Indexes are created only after every document landed.
        let indexes = self.copy_indexes(source, target, &collection).await?;
        info!(collection = %collection, copied, indexes, "driver copy complete");
        Ok(CopyOutcome {
            documents: copied,
            indexes,
        })
    }

    /// Insert one batch with an ordered bulk write, falling back to
    /// document-by-document reconciliation on a duplicate key.
    async fn write_batch(
        &self,
        target: &Collection<Document>,
        collection: &str,
        batch: &[Document],
        batch_index: u64,
    ) -> Result<u64> {
        match target.insert_many(batch).ordered(true).await {
            Ok(result) => Ok(result.inserted_ids.len() as u64),
            Err(err) if is_duplicate_key(&err) => {
                debug!(collection, batch_index, "duplicate key in batch, reconciling");
                self.reconcile_batch(target, collection, batch, batch_index).await
            }
            Err(err) => Err(Error::copy(collection, batch_index, err.to_string())),
        }
    }

    /// Re-run a batch one document at a time. A duplicate whose target
    /// content is identical counts as already copied; a duplicate with
    /// differing content is a real conflict.
    async fn reconcile_batch(
        &self,
        target: &Collection<Document>,
        collection: &str,
        batch: &[Document],
        batch_index: u64,
    ) -> Result<u64> {
        let mut confirmed: u64 = 0;
        for document in batch {
            match target.insert_one(document).await {
                Ok(_) => confirmed += 1,
                Err(err) if is_duplicate_key(&err) => {
                    let id = document.get("_id").cloned().unwrap_or(Bson::Null);
                    let existing = target
                        .find_one(doc! { "_id": id.clone() })
                        .await
                        .map_err(|e| Error::copy(collection, batch_index, e.to_string()))?;
                    match existing {
                        Some(found) if identical(&found, document) => confirmed += 1,
                        _ => {
                            return Err(Error::copy(
                                collection,
                                batch_index,
                                format!("duplicate key {id} with differing content"),
                            ))
                        }
                    }
                }
                Err(err) => return Err(Error::copy(collection, batch_index, err.to_string())),
            }
        }
        Ok(confirmed)
    }

    /// Re-create every source index except the implicit `_id_` one.
    async fn copy_indexes(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
        collection: &str,
    ) -> Result<u32> {
        let mut cursor = source
            .list_indexes()
            .await
            .map_err(|e| Error::copy(collection, 0, format!("failed to list indexes: {e}")))?;

        let mut created: u32 = 0;
        let mut ordinal: u64 = 0;
        while let Some(index) = cursor
            .try_next()
            .await
            .map_err(|e| Error::copy(collection, ordinal, format!("index cursor failed: {e}")))?
        {
            if index_name(&index).is_some_and(|name| name == "_id_") {
                continue;
            }
            let name = index_name(&index).unwrap_or("<unnamed>").to_string();
            match target.create_index(index).await {
                Ok(_) => {
                    debug!(collection, index = %name, "created index");
                    created += 1;
                }
                Err(err) if is_index_conflict(&err) => {
                    return Err(Error::copy(
                        collection,
                        ordinal,
                        format!("index '{name}' conflicts with an existing index: {err}"),
                    ));
                }
                Err(err) => {
                    return Err(Error::copy(
                        collection,
                        ordinal,
                        format!("failed to create index '{name}': {err}"),
                    ));
                }
            }
            ordinal += 1;
        }
        if created == 0 {
            debug!(collection, "no secondary indexes to copy");
        }
        Ok(created)
    }
}

fn emit(progress: Option<&ProgressSender>, copied: u64, total: u64) {
    if let Some(sender) = progress {
        // Receiver may be gone; progress is advisory.
        let _ = sender.send(ProgressEvent { copied, total });
    }
}

fn index_name(index: &IndexModel) -> Option<&str> {
    index.options.as_ref().and_then(|o| o.name.as_deref())
}

/// Byte-for-byte document comparison
fn identical(a: &Document, b: &Document) -> bool {
    match (mongodb::bson::to_vec(a), mongodb::bson::to_vec(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

const DUPLICATE_KEY: i32 = 11000;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        _ => false,
    }
}

fn is_index_conflict(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        ErrorKind::Command(command) => {
            command.code == INDEX_OPTIONS_CONFLICT || command.code == INDEX_KEY_SPECS_CONFLICT
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_never_zero() {
        let copier = DocumentCopier::new(0);
        assert_eq!(copier.batch_size, 1);
    }

    #[test]
    fn identical_is_order_sensitive() {
        let a = doc! { "x": 1, "y": 2 };
        let b = doc! { "y": 2, "x": 1 };
        assert!(identical(&a, &a.clone()));
        // MongoDB preserves field order, so a reordered document is a
        // different document.
        assert!(!identical(&a, &b));
    }

    #[test]
    fn progress_send_never_blocks_without_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(Some(&tx), 10, 100);
        emit(None, 10, 100);
    }

    #[test]
    fn index_name_extraction() {
        let model = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                mongodb::options::IndexOptions::builder()
                    .name(Some("email_1".to_string()))
                    .build(),
            )
            .build();
        assert_eq!(index_name(&model), Some("email_1"));

        let bare = IndexModel::builder().keys(doc! { "email": 1 }).build();
        assert_eq!(index_name(&bare), None);
    }
}
