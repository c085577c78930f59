//! Backup archive handling for mongoferry
//!
//! Turns a dump directory into a single timestamped `.tar.gz` file
//! and back, and computes the SHA-256 checksums used to verify that
//! an archive survived its trip through a storage backend intact.
//! Inside every archive the dump lives under a top-level `dump/`
//! entry, so extraction always lands in a predictable place.
//!
//! Compression and hashing are CPU-bound file work, so they run on
//! the blocking thread pool.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! # async fn example() -> mongoferry_types::Result<()> {
//! let descriptor =
//!     mongoferry_archive::create(Path::new("/tmp/dump"), Path::new("/tmp/staging"), "production")
//!         .await?;
//! println!("{} ({} bytes)", descriptor.name, descriptor.size);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mongoferry_types::{ArchiveDescriptor, ArchiveName, Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Top-level directory name inside every archive
pub const DUMP_ENTRY: &str = "dump";

/// Pack a dump directory into the tar.gz archive at `archive_path`
pub async fn pack(dump_dir: &Path, archive_path: &Path) -> Result<()> {
    let dump_dir = dump_dir.to_path_buf();
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || pack_blocking(&dump_dir, &archive_path))
        .await
        .map_err(|e| Error::archive(format!("pack task panicked: {e}")))?
}

/// Extract an archive into `dest_dir`.
///
/// The dump contents end up under `dest_dir/dump/`.
pub async fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_blocking(&archive_path, &dest_dir))
        .await
        .map_err(|e| Error::archive(format!("unpack task panicked: {e}")))?
}

/// SHA-256 of a file, hex-encoded
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_blocking(&path))
        .await
        .map_err(|e| Error::archive(format!("checksum task panicked: {e}")))?
}

/// Pack a dump directory into a freshly named archive under
/// `staging_dir` and describe the result.
///
/// The archive is named `<UTC timestamp>-<database>.tar.gz` and its
/// size and checksum are captured before anything touches a storage
/// backend.
pub async fn create(
    dump_dir: &Path,
    staging_dir: &Path,
    database: &str,
) -> Result<ArchiveDescriptor> {
    let name = ArchiveName::new(database.to_string());
    let path = staging_dir.join(name.file_name());
    tokio::fs::create_dir_all(staging_dir).await?;
    pack(dump_dir, &path).await?;

    let size = tokio::fs::metadata(&path).await?.len();
    if size == 0 {
        return Err(Error::archive(format!(
            "produced empty archive {}",
            path.display()
        )));
    }
    let checksum = sha256_file(&path).await?;
    info!(archive = %name.file_name(), size, "archive created");
    Ok(ArchiveDescriptor::new(path, name, size, checksum))
}

fn pack_blocking(dump_dir: &Path, archive_path: &Path) -> Result<()> {
    if !dump_dir.is_dir() {
        return Err(Error::archive(format!(
            "dump directory {} does not exist",
            dump_dir.display()
        )));
    }
    let files = WalkDir::new(dump_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .count();
    debug!(dump = %dump_dir.display(), files, "packing dump directory");

    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(DUMP_ENTRY, dump_dir)
        .map_err(|e| Error::archive(format!("failed to add dump contents: {e}")))?;
    builder
        .into_inner()
        .map_err(|e| Error::archive(format!("failed to finish tar stream: {e}")))?
        .finish()
        .map_err(|e| Error::archive(format!("failed to finish gzip stream: {e}")))?;
    Ok(())
}

fn unpack_blocking(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file = File::open(archive_path).map_err(|e| {
        Error::archive(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    std::fs::create_dir_all(dest_dir)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest_dir)
        .map_err(|e| Error::archive(format!("extraction failed: {e}")))?;

    let dump = dest_dir.join(DUMP_ENTRY);
    if !dump.is_dir() {
        return Err(Error::archive(format!(
            "archive {} has no {DUMP_ENTRY}/ entry",
            archive_path.display()
        )));
    }
    Ok(dump)
}

fn sha256_blocking(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::archive(format!("cannot open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn sample_dump(root: &Path) -> PathBuf {
        let dump = root.join("dump").join("production");
        tokio::fs::create_dir_all(&dump).await.unwrap();
        tokio::fs::write(dump.join("users.bson"), b"\x05\x00\x00\x00\x00")
            .await
            .unwrap();
        tokio::fs::write(dump.join("users.metadata.json"), b"{\"indexes\":[]}")
            .await
            .unwrap();
        root.join("dump")
    }

    #[tokio::test]
    async fn pack_then_unpack_round_trips_the_dump() {
        let staging = TempDir::new().unwrap();
        let dump_dir = sample_dump(staging.path()).await;

        let archive = staging.path().join("backup.tar.gz");
        pack(&dump_dir, &archive).await.unwrap();
        assert!(archive.is_file());

        let extract = TempDir::new().unwrap();
        let extracted = unpack(&archive, extract.path()).await.unwrap();
        assert_eq!(extracted, extract.path().join("dump"));
        let restored = extracted.join("production").join("users.bson");
        let content = tokio::fs::read(&restored).await.unwrap();
        assert_eq!(content, b"\x05\x00\x00\x00\x00");
    }

    #[tokio::test]
    async fn create_names_and_checksums_the_archive() {
        let staging = TempDir::new().unwrap();
        let dump_dir = sample_dump(staging.path()).await;

        let descriptor = create(&dump_dir, &staging.path().join("out"), "production")
            .await
            .unwrap();
        assert!(descriptor.path.is_file());
        assert!(descriptor.size > 0);
        assert_eq!(descriptor.checksum.len(), 64);
        assert_eq!(descriptor.database, "production");
        assert!(descriptor.name.ends_with("-production.tar.gz"));

        let recomputed = sha256_file(&descriptor.path).await.unwrap();
        assert_eq!(recomputed, descriptor.checksum);
    }

    #[tokio::test]
    async fn checksum_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        tokio::fs::write(&a, b"one").await.unwrap();
        tokio::fs::write(&b, b"two").await.unwrap();
        assert_ne!(
            sha256_file(&a).await.unwrap(),
            sha256_file(&b).await.unwrap()
        );
    }

    #[tokio::test]
    async fn known_checksum_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        tokio::fs::write(&path, b"").await.unwrap();
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn packing_a_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = pack(&dir.path().join("nope"), &dir.path().join("out.tar.gz"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn unpacking_a_tarball_without_dump_entry_fails() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("stray.txt");
        tokio::fs::write(&content, b"not a dump").await.unwrap();

        let archive = dir.path().join("bad.tar.gz");
        let file = File::create(&archive).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_path_with_name(&content, "stray.txt").unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = unpack(&archive, &dir.path().join("out")).await.unwrap_err();
        assert!(err.to_string().contains("dump"));
    }
}
