//! Native MongoDB tool detection and invocation
//!
//! This crate wraps the external `mongodump` and `mongorestore`
//! executables behind two small surfaces:
//!
//! - [`probe`]: detect whether the tools are installed and usable.
//!   Absence is an expected, non-fatal state the strategy reacts to.
//! - [`NativeTools`]: run dump, restore, or a dump piped straight into
//!   restore, mapping any nonzero exit to a structured error carrying
//!   the captured standard error.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod native;
pub mod probe;

pub use native::{NativeTools, NsMapping};
pub use probe::{probe, ToolCapabilities};
