//! Archive descriptors and the backup naming convention

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// File-name suffix shared by every backup archive
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15; // "20240115-103000"

/// The `<UTC-timestamp>-<database>.tar.gz` naming convention.
///
/// The database name is part of the restore contract: restore parses
/// it out of the filename when the caller does not supply one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    /// Archive creation time, UTC, second precision
    pub timestamp: DateTime<Utc>,
    /// Database the archive was taken from
    pub database: String,
}

impl ArchiveName {
    /// Name an archive for `database` taken now
    pub fn new<D: Into<String>>(database: D) -> Self {
        // Truncate to whole seconds so format/parse round-trips.
        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_else(Utc::now);
        Self {
            timestamp: now,
            database: database.into(),
        }
    }

    /// Parse a file name of the form `20240115-103000-production.tar.gz`
    pub fn parse(file_name: &str) -> Result<Self> {
        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX).ok_or_else(|| {
            Error::archive(format!("'{file_name}' does not end in {ARCHIVE_SUFFIX}"))
        })?;
        if stem.len() < TIMESTAMP_LEN + 2 || stem.as_bytes().get(TIMESTAMP_LEN) != Some(&b'-') {
            return Err(Error::archive(format!(
                "'{file_name}' does not match <timestamp>-<database>{ARCHIVE_SUFFIX}"
            )));
        }
        let naive = NaiveDateTime::parse_from_str(&stem[..TIMESTAMP_LEN], TIMESTAMP_FORMAT)
            .map_err(|e| Error::archive(format!("bad timestamp in '{file_name}': {e}")))?;
        Ok(Self {
            timestamp: Utc.from_utc_datetime(&naive),
            database: stem[TIMESTAMP_LEN + 1..].to_string(),
        })
    }

    /// Render the file name
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}{ARCHIVE_SUFFIX}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.database
        )
    }

    /// Whether `file_name` is an archive of `database`
    pub fn matches_database(file_name: &str, database: &str) -> bool {
        file_name.ends_with(&format!("-{database}{ARCHIVE_SUFFIX}"))
    }
}

/// A staged backup archive ready for (or retrieved from) storage
#[derive(Debug, Clone)]
pub struct ArchiveDescriptor {
    /// Local staging path of the archive file
    pub path: PathBuf,
    /// Logical name, `<timestamp>-<database>.tar.gz`
    pub name: String,
    /// Database the archive was taken from
    pub database: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Archive size in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the archive file
    pub checksum: String,
}

impl ArchiveDescriptor {
    /// Assemble a descriptor for a freshly packed archive
    pub fn new<P: Into<PathBuf>>(
        path: P,
        name: ArchiveName,
        size: u64,
        checksum: String,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.file_name(),
            database: name.database,
            created_at: name.timestamp,
            size,
            checksum,
        }
    }

    /// The staging path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Proof that a verified safety backup exists.
///
/// The drop step of a destructive operation takes this by value when
/// `auto_backup` is set, so the backup-before-drop ordering is
/// enforced by the signature rather than by sequencing discipline.
#[derive(Debug)]
pub struct SafetyBackup {
    archive: ArchiveDescriptor,
}

impl SafetyBackup {
    /// Accept a completed backup archive after verifying it is
    /// non-empty. A zero-size archive means the dump produced nothing
    /// and must not authorize a drop.
    pub fn verified(archive: ArchiveDescriptor) -> Result<Self> {
        if archive.size == 0 {
            return Err(Error::archive(format!(
                "safety backup '{}' is empty; refusing to authorize a destructive drop",
                archive.name
            )));
        }
        Ok(Self { archive })
    }

    /// The underlying archive
    pub fn archive(&self) -> &ArchiveDescriptor {
        &self.archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_round_trips() {
        let name = ArchiveName::new("production");
        let parsed = ArchiveName::parse(&name.file_name()).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn parse_known_name() {
        let parsed = ArchiveName::parse("20240115-103000-production.tar.gz").unwrap();
        assert_eq!(parsed.database, "production");
        assert_eq!(parsed.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 10:30:00");
    }

    #[test]
    fn database_names_may_contain_dashes() {
        let parsed = ArchiveName::parse("20240115-103000-my-app-db.tar.gz").unwrap();
        assert_eq!(parsed.database, "my-app-db");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert!(ArchiveName::parse("backup.tar.gz").is_err());
        assert!(ArchiveName::parse("20240115-103000-db.zip").is_err());
        assert!(ArchiveName::parse("2024x115-103000-db.tar.gz").is_err());
        assert!(ArchiveName::parse("20240115-103000-.tar.gz").is_err());
    }

    #[test]
    fn matches_database_by_suffix() {
        assert!(ArchiveName::matches_database(
            "20240115-103000-production.tar.gz",
            "production"
        ));
        assert!(!ArchiveName::matches_database(
            "20240115-103000-production.tar.gz",
            "staging"
        ));
        // "duction" is not "production": the dash must separate.
        assert!(!ArchiveName::matches_database(
            "20240115-103000-production.tar.gz",
            "duction"
        ));
    }

    #[test]
    fn safety_backup_rejects_empty_archives() {
        let name = ArchiveName::new("db");
        let empty = ArchiveDescriptor::new("/tmp/a.tar.gz", name.clone(), 0, "deadbeef".into());
        assert!(SafetyBackup::verified(empty).is_err());

        let ok = ArchiveDescriptor::new("/tmp/a.tar.gz", name, 1024, "deadbeef".into());
        assert!(SafetyBackup::verified(ok).is_ok());
    }

    proptest! {
        #[test]
        fn name_round_trips_for_any_database(db in "[a-z][a-z0-9_-]{0,30}") {
            let name = ArchiveName::new(db.clone());
            let parsed = ArchiveName::parse(&name.file_name()).unwrap();
            prop_assert_eq!(parsed.database, db);
        }
    }
}
