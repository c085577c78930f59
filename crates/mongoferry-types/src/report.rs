//! Structured results returned to callers

use crate::spec::ToolKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-collection outcome of a copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionCopyReport {
    /// Collection name
    pub collection: String,
    /// Documents written to the target
    pub documents: u64,
    /// Secondary indexes re-created on the target
    pub indexes: u32,
}

/// Result of one [`CopySpec`](crate::CopySpec) execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Per-collection reports, in processing order
    pub collections: Vec<CollectionCopyReport>,
    /// Total elapsed wall-clock time
    pub elapsed: Duration,
    /// Which physical path executed the copy
    #[serde(with = "tool_kind_serde")]
    pub tool_used: ToolKind,
    /// Whether this was a dry run (no mutation occurred)
    pub dry_run: bool,
    /// Non-fatal findings: fallback reasons, skipped steps,
    /// verification mismatches
    pub warnings: Vec<String>,
    /// Verification reports when the copy spec requested verification
    pub verification: Vec<VerificationReport>,
}

impl CopyResult {
    /// Total documents copied across all collections
    pub fn documents_copied(&self) -> u64 {
        self.collections.iter().map(|c| c.documents).sum()
    }

    /// Total secondary indexes created across all collections
    pub fn indexes_copied(&self) -> u32 {
        self.collections.iter().map(|c| c.indexes).sum()
    }

    /// Record a non-fatal finding
    pub fn warn<S: Into<String>>(&mut self, message: S) {
        self.warnings.push(message.into());
    }
}

/// Outcome of a post-copy integrity verification.
///
/// Derived once after a successful copy and never mutated afterwards.
/// Mismatches are findings, not failures; the caller decides policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Collection that was verified
    pub collection: String,
    /// Exact document count on the source
    pub source_count: u64,
    /// Exact document count on the target
    pub target_count: u64,
    /// Whether the counts match
    pub count_match: bool,
    /// Source index key specs missing on the target
    pub missing_indexes: Vec<String>,
    /// Identifiers of sampled documents that are absent or differ on
    /// the target
    pub sample_mismatches: Vec<String>,
    /// Aggregate checksum comparison; `None` when the collection was
    /// over the checksum threshold
    pub checksum_match: Option<bool>,
}

impl VerificationReport {
    /// True iff every applicable check passed
    pub fn overall_match(&self) -> bool {
        self.count_match
            && self.missing_indexes.is_empty()
            && self.sample_mismatches.is_empty()
            && self.checksum_match.unwrap_or(true)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        if self.overall_match() {
            format!("{}: verified ({} documents)", self.collection, self.source_count)
        } else {
            format!(
                "{}: MISMATCH (counts {}/{}, {} missing indexes, {} sample mismatches, checksum {:?})",
                self.collection,
                self.source_count,
                self.target_count,
                self.missing_indexes.len(),
                self.sample_mismatches.len(),
                self.checksum_match,
            )
        }
    }
}

/// Outcome of a restore operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Database restored into
    pub database: String,
    /// Collections restored
    pub collections: u32,
    /// Documents present in the target database after restore
    pub documents: u64,
    /// Archive the restore was sourced from
    pub source_archive: String,
    /// Which physical path executed the restore
    #[serde(with = "tool_kind_serde")]
    pub tool_used: ToolKind,
}

/// Advisory progress event emitted by the fallback copier.
///
/// Consumers may drain these at leisure or not at all; correctness
/// never depends on the channel being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Documents copied so far in this collection
    pub copied: u64,
    /// Estimated total from the pre-count
    pub total: u64,
}

mod tool_kind_serde {
    use super::ToolKind;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(kind: &ToolKind, serializer: S) -> Result<S::Ok, S::Error> {
        kind.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ToolKind, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "native" => Ok(ToolKind::Native),
            "fallback" => Ok(ToolKind::Fallback),
            other => Err(serde::de::Error::custom(format!("unknown tool kind '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(documents: u64, indexes: u32) -> CollectionCopyReport {
        CollectionCopyReport {
            collection: "users".into(),
            documents,
            indexes,
        }
    }

    #[test]
    fn copy_result_totals() {
        let result = CopyResult {
            collections: vec![report(3, 2), report(7, 1)],
            elapsed: Duration::from_secs(1),
            tool_used: ToolKind::Fallback,
            dry_run: false,
            warnings: vec![],
            verification: vec![],
        };
        assert_eq!(result.documents_copied(), 10);
        assert_eq!(result.indexes_copied(), 3);
    }

    #[test]
    fn verification_overall_match() {
        let mut report = VerificationReport {
            collection: "users".into(),
            source_count: 3,
            target_count: 3,
            count_match: true,
            missing_indexes: vec![],
            sample_mismatches: vec![],
            checksum_match: Some(true),
        };
        assert!(report.overall_match());

        report.sample_mismatches.push("ObjectId(\"abc\")".into());
        assert!(!report.overall_match());
        assert!(report.summary().contains("MISMATCH"));
    }

    #[test]
    fn skipped_checksum_does_not_fail_verification() {
        let report = VerificationReport {
            collection: "events".into(),
            source_count: 50_000,
            target_count: 50_000,
            count_match: true,
            missing_indexes: vec![],
            sample_mismatches: vec![],
            checksum_match: None,
        };
        assert!(report.overall_match());
    }

    #[test]
    fn copy_result_serializes_tool_kind_as_string() {
        let result = CopyResult {
            collections: vec![],
            elapsed: Duration::from_secs(0),
            tool_used: ToolKind::Native,
            dry_run: true,
            warnings: vec![],
            verification: vec![],
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"tool_used\":\"native\""));
        let parsed: CopyResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tool_used, ToolKind::Native);
        assert!(parsed.dry_run);
    }
}
