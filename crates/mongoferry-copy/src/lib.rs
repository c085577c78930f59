//! Driver-level document operations for mongoferry
//!
//! The fallback path of the copy engine: when the native tools are
//! unavailable or unsuitable, collections are moved document by
//! document through the MongoDB driver. This crate provides:
//!
//! - [`client`]: endpoint connection with a ping check and collection
//!   resolution
//! - [`DocumentCopier`]: batched, idempotency-aware collection copy
//!   with index re-creation and advisory progress events
//! - [`IntegrityVerifier`]: post-copy count/index/sample/checksum
//!   comparison
//! - [`export`]: mongodump-compatible BSON export/import used by
//!   backup and restore when the native tools are absent

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod copier;
pub mod export;
pub mod verify;

pub use client::{connect, resolve_collections};
pub use copier::{CopyOutcome, DocumentCopier, ProgressSender};
pub use export::{export_collection, import_collection, ExportMetadata, IndexSpec};
pub use verify::IntegrityVerifier;
