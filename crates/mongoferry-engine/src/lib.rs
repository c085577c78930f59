//! Orchestration layer for mongoferry
//!
//! Ties the lower crates together into the three top-level
//! operations:
//!
//! - [`CopyStrategy`]: copy collections between two live deployments,
//!   preferring the native `mongodump`/`mongorestore` pipe and falling
//!   back to the driver-level copier
//! - [`BackupOrchestrator`]: dump a database, pack it into a
//!   timestamped archive, and push it to a storage backend
//! - [`RestoreOrchestrator`]: fetch an archive, extract it, and
//!   restore it into a target deployment
//!
//! Destructive steps (dropping target data) only run after an
//! explicit flag, and with `auto_backup` set they are gated on a
//! verified safety backup.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mongoferry_config::Config;
//! use mongoferry_engine::CopyStrategy;
//! use mongoferry_types::{CollectionSelection, ConnectionEndpoint, CopySpec};
//!
//! # async fn example() -> mongoferry_types::Result<()> {
//! let spec = CopySpec::new(
//!     ConnectionEndpoint::parse("mongodb://staging.example.com/app")?,
//!     ConnectionEndpoint::parse("mongodb://localhost/app")?,
//!     CollectionSelection::All,
//! )
//! .verify(true);
//!
//! let result = CopyStrategy::new(Config::default()).execute(spec).await?;
//! println!(
//!     "copied {} documents via {}",
//!     result.documents_copied(),
//!     result.tool_used
//! );
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod restore;
pub mod strategy;

pub use backup::BackupOrchestrator;
pub use restore::RestoreOrchestrator;
pub use strategy::CopyStrategy;
