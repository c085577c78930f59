//! Core types for mongoferry
//!
//! This crate defines the shared vocabulary of the mongoferry workspace:
//! the error taxonomy, connection endpoints, copy specifications and
//! results, verification reports, archive descriptors and progress
//! events. It deliberately carries no driver or runtime dependencies so
//! every other crate can depend on it.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod endpoint;
pub mod error;
pub mod report;
pub mod spec;

pub use archive::{ArchiveDescriptor, ArchiveName, SafetyBackup};
pub use endpoint::ConnectionEndpoint;
pub use error::{Error, ErrorKind, Result};
pub use report::{
    CollectionCopyReport, CopyResult, ProgressEvent, RestoreOutcome, VerificationReport,
};
pub use spec::{CollectionSelection, CopySpec, RestoreSpec, ToolKind};
