//! Integration tests for mongoferry
//!
//! Everything here runs against the local filesystem; tests that
//! would need a live MongoDB deployment or a reachable SSH/FTP server
//! stay in their crates' unit suites or out of CI entirely.

use mongodb::bson::doc;
use mongoferry_config::Config;
use mongoferry_engine::BackupOrchestrator;
use mongoferry_storage::{open, StorageBackend, StorageUrl};
use mongoferry_types::{ArchiveName, CollectionSelection, ConnectionEndpoint, CopySpec};
use std::path::Path;
use tempfile::TempDir;

/// Build a dump directory shaped like a real single-database dump
async fn sample_dump(root: &Path, database: &str) -> std::path::PathBuf {
    mongoferry_tests::init_tracing();
    let db_dir = root.join("dump").join(database);
    tokio::fs::create_dir_all(&db_dir).await.unwrap();

    let mut users = Vec::new();
    for i in 0..3 {
        users.extend(mongodb::bson::to_vec(&doc! { "_id": i, "name": format!("user-{i}") }).unwrap());
    }
    tokio::fs::write(db_dir.join("users.bson"), users).await.unwrap();
    tokio::fs::write(
        db_dir.join("users.metadata.json"),
        br#"{"collectionName":"users","indexes":[{"name":"name_1","key":{"name":1}}]}"#,
    )
    .await
    .unwrap();
    root.join("dump")
}

#[tokio::test]
async fn archive_survives_a_trip_through_local_storage() {
    let staging = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    let dump = sample_dump(staging.path(), "production").await;

    // Pack, upload, download, unpack: the dump must come back intact.
    let descriptor = mongoferry_archive::create(&dump, &staging.path().join("out"), "production")
        .await
        .unwrap();

    let url = StorageUrl::Local {
        path: store.path().to_path_buf(),
    };
    let backend = open(&url, &Config::default());
    backend.test_connection().await.unwrap();
    backend.put(&descriptor.path, &descriptor.name).await.unwrap();

    let fetched = staging.path().join("fetched.tar.gz");
    backend.get(&descriptor.name, &fetched).await.unwrap();
    assert_eq!(
        mongoferry_archive::sha256_file(&fetched).await.unwrap(),
        descriptor.checksum
    );

    let extract = TempDir::new().unwrap();
    let dump_root = mongoferry_archive::unpack(&fetched, extract.path()).await.unwrap();
    let restored = tokio::fs::read(dump_root.join("production").join("users.bson"))
        .await
        .unwrap();
    let documents = mongoferry_copy::export::parse_documents(&restored, "users").unwrap();
    assert_eq!(documents.len(), 3);
    assert_eq!(documents[1], doc! { "_id": 1, "name": "user-1" });
}

#[tokio::test]
async fn backup_listing_sees_only_archives_of_the_requested_database() {
    let staging = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();

    for database in ["production", "staging"] {
        let dump_root = staging.path().join(database);
        let dump = sample_dump(&dump_root, database).await;
        let descriptor = mongoferry_archive::create(&dump, &dump_root.join("out"), database)
            .await
            .unwrap();
        tokio::fs::copy(&descriptor.path, store.path().join(&descriptor.name))
            .await
            .unwrap();
    }
    tokio::fs::write(store.path().join("README.txt"), b"not an archive")
        .await
        .unwrap();

    let orchestrator = BackupOrchestrator::new(Config::default());
    let url = StorageUrl::Local {
        path: store.path().to_path_buf(),
    };

    let all = orchestrator.list_backups(&url, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let production = orchestrator.list_backups(&url, Some("production")).await.unwrap();
    assert_eq!(production.len(), 1);
    let name = ArchiveName::parse(&production[0].name).unwrap();
    assert_eq!(name.database, "production");
    assert!(production[0].size > 0);

    orchestrator
        .delete_backup(&url, &production[0].name)
        .await
        .unwrap();
    assert_eq!(orchestrator.list_backups(&url, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn archive_names_round_trip_and_sort_chronologically() {
    let older = ArchiveName::parse("20240115-103000-production.tar.gz").unwrap();
    let newer = ArchiveName::parse("20240116-090000-production.tar.gz").unwrap();
    assert!(older.timestamp < newer.timestamp);
    assert!(older.file_name() < newer.file_name());
    assert_eq!(older.file_name(), "20240115-103000-production.tar.gz");

    // Database names may themselves contain dashes.
    let dashed = ArchiveName::parse("20240115-103000-my-app-db.tar.gz").unwrap();
    assert_eq!(dashed.database, "my-app-db");
}

#[test]
fn storage_urls_map_to_the_expected_backends() {
    let config = Config::default();
    for (input, kind) in [
        ("/var/backups", "local"),
        ("ssh://backup@vault.example.com/srv/backups", "ssh"),
        ("rsync://backup@vault.example.com/srv/backups", "ssh"),
        ("ftp://anon:pw@files.example.com/pub", "ftp"),
    ] {
        let url = StorageUrl::parse(input).unwrap();
        assert_eq!(open(&url, &config).kind(), kind, "for {input}");
    }
}

#[test]
fn copy_specs_reject_self_copies_before_any_io() {
    let endpoint = ConnectionEndpoint::new("mongodb://db.example.com/app", "app");
    let same = CopySpec::new(endpoint.clone(), endpoint.clone(), CollectionSelection::All);
    assert!(same.validate().is_err());

    let renamed = CopySpec::new(
        endpoint.clone(),
        endpoint.with_collection("users_snapshot"),
        CollectionSelection::One("users".into()),
    );
    assert!(renamed.validate().is_ok());
}
