//! Integration test suite for mongoferry
//!
//! The actual tests live under `tests/`; this crate only exists to
//! give them a workspace member with the full dependency set. Tests
//! that need a live MongoDB deployment or remote storage are kept out
//! of this suite; everything here runs against the local filesystem.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Install a fmt tracing subscriber honoring `RUST_LOG`, so failing
/// tests can be rerun with engine logs visible. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
