//! Post-copy integrity verification

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Collection;
use mongoferry_types::{Error, Result, VerificationReport};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Compares a copied collection against its source.
///
/// Four checks, in order: exact document counts, secondary index key
/// specs, a random sample compared document-by-document, and (for
/// small collections only) a content checksum over every document in
/// `_id` order. Verification never writes to either side.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityVerifier {
    sample_size: u32,
    checksum_threshold: u64,
}

impl IntegrityVerifier {
    /// Create a verifier.
    ///
    /// `sample_size` documents are drawn at random for the sample
    /// check; the checksum check runs only when the source holds
    /// fewer than `checksum_threshold` documents.
    pub fn new(sample_size: u32, checksum_threshold: u64) -> Self {
        Self {
            sample_size,
            checksum_threshold,
        }
    }

    /// Whether a collection of `source_count` documents is small
    /// enough for the full checksum pass.
    fn checksum_applies(&self, source_count: u64) -> bool {
        source_count < self.checksum_threshold
    }

    /// Verify `target` against `source` and produce a report.
    pub async fn verify(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
    ) -> Result<VerificationReport> {
        let collection = source.name().to_string();
        debug!(collection = %collection, "verifying copy");

        let source_count = exact_count(source).await?;
        let target_count = exact_count(target).await?;
        let count_match = source_count == target_count;
        if !count_match {
            warn!(
                collection = %collection,
                source_count, target_count, "document counts differ"
            );
        }

        let missing_indexes = self.missing_indexes(source, target, &collection).await?;
        let sample_mismatches = self.sample_mismatches(source, target, &collection).await?;

        let checksum_match = if self.checksum_applies(source_count) {
            Some(self.checksums_match(source, target, &collection).await?)
        } else {
            debug!(
                collection = %collection,
                source_count, "collection too large for checksum check"
            );
            None
        };

        let report = VerificationReport {
            collection,
            source_count,
            target_count,
            count_match,
            missing_indexes,
            sample_mismatches,
            checksum_match,
        };
        info!(
            collection = %report.collection,
            passed = report.overall_match(),
            "verification finished"
        );
        Ok(report)
    }

    /// Source index key specs with no equivalent on the target.
    ///
    /// Indexes are matched by key spec rather than name, so a renamed
    /// but structurally identical index still passes.
    async fn missing_indexes(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
        collection: &str,
    ) -> Result<Vec<String>> {
        let source_keys = index_key_specs(source, collection).await?;
        let target_keys = index_key_specs(target, collection).await?;
        Ok(source_keys
            .into_iter()
            .filter(|spec| !target_keys.contains(spec))
            .collect())
    }

    /// Random-sample comparison. Returns the stringified `_id` of
    /// every sampled source document that is missing or differs on
    /// the target.
    async fn sample_mismatches(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
        collection: &str,
    ) -> Result<Vec<String>> {
        if self.sample_size == 0 {
            return Ok(Vec::new());
        }
        let pipeline = vec![doc! { "$sample": { "size": i64::from(self.sample_size) } }];
        let mut cursor = source
            .aggregate(pipeline)
            .await
            .map_err(|e| Error::verification(collection, format!("sample failed: {e}")))?;

        let mut mismatches = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|e| Error::verification(collection, format!("sample cursor failed: {e}")))?
        {
            let id = document.get("_id").cloned().unwrap_or(Bson::Null);
            let found = target
                .find_one(doc! { "_id": id.clone() })
                .await
                .map_err(|e| Error::verification(collection, e.to_string()))?;
            let matches = found.as_ref().is_some_and(|t| encode(t) == encode(&document));
            if !matches {
                mismatches.push(id.to_string());
            }
        }
        Ok(mismatches)
    }

    /// SHA-256 over every document in `_id` order, compared across
    /// both sides.
    async fn checksums_match(
        &self,
        source: &Collection<Document>,
        target: &Collection<Document>,
        collection: &str,
    ) -> Result<bool> {
        let source_digest = collection_checksum(source, collection).await?;
        let target_digest = collection_checksum(target, collection).await?;
        if source_digest != target_digest {
            warn!(collection, "content checksums differ");
        }
        Ok(source_digest == target_digest)
    }
}

async fn exact_count(collection: &Collection<Document>) -> Result<u64> {
    collection
        .count_documents(doc! {})
        .await
        .map_err(|e| Error::verification(collection.name(), format!("count failed: {e}")))
}

/// Key specs of every secondary index, serialized to canonical JSON
/// strings for set comparison. The implicit `_id_` index is skipped.
async fn index_key_specs(
    collection: &Collection<Document>,
    name: &str,
) -> Result<Vec<String>> {
    let mut cursor = collection
        .list_indexes()
        .await
        .map_err(|e| Error::verification(name, format!("failed to list indexes: {e}")))?;

    let mut specs = Vec::new();
    while let Some(index) = cursor
        .try_next()
        .await
        .map_err(|e| Error::verification(name, format!("index cursor failed: {e}")))?
    {
        if index.keys == doc! { "_id": 1 } {
            continue;
        }
        let spec = serde_json::to_string(&index.keys)
            .map_err(|e| Error::verification(name, format!("unserializable index keys: {e}")))?;
        specs.push(spec);
    }
    Ok(specs)
}

async fn collection_checksum(
    collection: &Collection<Document>,
    name: &str,
) -> Result<String> {
    let mut cursor = collection
        .find(doc! {})
        .sort(doc! { "_id": 1 })
        .await
        .map_err(|e| Error::verification(name, format!("checksum cursor failed: {e}")))?;

    let mut hasher = Sha256::new();
    while let Some(document) = cursor
        .try_next()
        .await
        .map_err(|e| Error::verification(name, format!("checksum read failed: {e}")))?
    {
        let bytes = mongodb::bson::to_vec(&document)
            .map_err(|e| Error::verification(name, format!("unserializable document: {e}")))?;
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn encode(document: &Document) -> Option<Vec<u8>> {
    mongodb::bson::to_vec(document).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_construction() {
        let verifier = IntegrityVerifier::new(100, 10_000);
        assert_eq!(verifier.sample_size, 100);
        assert_eq!(verifier.checksum_threshold, 10_000);
    }

    #[test]
    fn checksum_skipped_at_the_threshold() {
        let verifier = IntegrityVerifier::new(100, 10_000);
        assert!(verifier.checksum_applies(9_999));
        assert!(!verifier.checksum_applies(10_000));
        assert!(!verifier.checksum_applies(10_001));
    }

    #[test]
    fn id_index_keys_are_recognized() {
        assert_eq!(doc! { "_id": 1 }, doc! { "_id": 1 });
        assert_ne!(doc! { "_id": 1 }, doc! { "email": 1 });
    }

    #[test]
    fn key_specs_compare_as_canonical_json() {
        let a = serde_json::to_string(&doc! { "email": 1, "age": -1 }).unwrap();
        let b = serde_json::to_string(&doc! { "email": 1, "age": -1 }).unwrap();
        let c = serde_json::to_string(&doc! { "age": -1, "email": 1 }).unwrap();
        assert_eq!(a, b);
        // Compound index key order is significant.
        assert_ne!(a, c);
    }
}
