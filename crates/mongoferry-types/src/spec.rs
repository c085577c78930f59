//! Copy and restore operation specifications

use crate::endpoint::ConnectionEndpoint;
use crate::error::{Error, Result};

/// Which collections a copy operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSelection {
    /// Every collection in the source database, `system.*` excluded
    All,
    /// A single named collection
    One(String),
    /// An explicit list of collections
    Many(Vec<String>),
}

impl CollectionSelection {
    /// Validate the selection before any I/O happens.
    ///
    /// An explicit empty list or a blank collection name is a caller
    /// bug and is rejected up front.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::One(name) if name.trim().is_empty() => {
                Err(Error::validation("collection name is empty"))
            }
            Self::One(_) => Ok(()),
            Self::Many(names) if names.is_empty() => {
                Err(Error::validation("collection selection is empty"))
            }
            Self::Many(names) if names.iter().any(|n| n.trim().is_empty()) => {
                Err(Error::validation("collection selection contains an empty name"))
            }
            Self::Many(_) => Ok(()),
        }
    }

    /// Whether this selection covers a whole database or one whole
    /// collection, the shapes the native tools can express.
    pub fn is_native_expressible(&self) -> bool {
        matches!(self, Self::All | Self::One(_))
    }
}

/// Which physical path executed a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Native `mongodump`/`mongorestore` subprocesses
    Native,
    /// Driver-level document copy
    Fallback,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Specification for one copy operation, built by the caller and
/// consumed once by the strategy.
#[derive(Debug, Clone)]
pub struct CopySpec {
    /// Source endpoint
    pub source: ConnectionEndpoint,
    /// Target endpoint
    pub target: ConnectionEndpoint,
    /// Collections to copy
    pub selection: CollectionSelection,
    /// Drop target collections before writing
    pub drop_target: bool,
    /// Validate and plan without mutating either endpoint
    pub dry_run: bool,
    /// Skip the native tools even when available
    pub force_fallback: bool,
    /// Run integrity verification after the copy
    pub verify: bool,
    /// Back up the target before any destructive drop
    pub auto_backup: bool,
    /// Batch size override for the fallback copier
    pub batch_size: Option<u32>,
}

impl CopySpec {
    /// Create a spec with default flags (nothing dropped, no dry run,
    /// native tools allowed, no verification, no auto backup)
    pub fn new(
        source: ConnectionEndpoint,
        target: ConnectionEndpoint,
        selection: CollectionSelection,
    ) -> Self {
        Self {
            source,
            target,
            selection,
            drop_target: false,
            dry_run: false,
            force_fallback: false,
            verify: false,
            auto_backup: false,
            batch_size: None,
        }
    }

    /// Drop target collections before the copy write phase
    pub fn drop_target(mut self, drop: bool) -> Self {
        self.drop_target = drop;
        self
    }

    /// Evaluate without side effects
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Force the driver-level fallback path
    pub fn force_fallback(mut self, force: bool) -> Self {
        self.force_fallback = force;
        self
    }

    /// Verify integrity after the copy
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Create a safety backup before any destructive drop
    pub fn auto_backup(mut self, backup: bool) -> Self {
        self.auto_backup = backup;
        self
    }

    /// Override the fallback copier's batch size
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Validate everything that can be checked without I/O
    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        if self.source.uri() == self.target.uri()
            && self.source.database() == self.target.database()
        {
            if let (CollectionSelection::One(s), Some(t)) =
                (&self.selection, self.target.collection())
            {
                if s == t {
                    return Err(Error::validation(
                        "source and target are the same collection",
                    ));
                }
            } else {
                return Err(Error::validation("source and target are the same database"));
            }
        }
        Ok(())
    }
}

/// Specification for one restore operation
#[derive(Debug, Clone)]
pub struct RestoreSpec {
    /// Remote identifier of the archive to restore
    pub archive: String,
    /// Target endpoint; its database is overridden by
    /// `target_database` when set
    pub target: ConnectionEndpoint,
    /// Explicit target database; parsed from the archive name when
    /// absent
    pub target_database: Option<String>,
    /// Drop the target database before restoring
    pub drop_target: bool,
    /// Back up the target before any destructive drop
    pub auto_backup: bool,
}

impl RestoreSpec {
    /// Create a restore spec with default flags
    pub fn new<A: Into<String>>(archive: A, target: ConnectionEndpoint) -> Self {
        Self {
            archive: archive.into(),
            target,
            target_database: None,
            drop_target: false,
            auto_backup: false,
        }
    }

    /// Restore into a database other than the one encoded in the
    /// archive name
    pub fn target_database<D: Into<String>>(mut self, database: D) -> Self {
        self.target_database = Some(database.into());
        self
    }

    /// Drop the target database before restoring
    pub fn drop_target(mut self, drop: bool) -> Self {
        self.drop_target = drop;
        self
    }

    /// Create a safety backup before any destructive drop
    pub fn auto_backup(mut self, backup: bool) -> Self {
        self.auto_backup = backup;
        self
    }
}
