//! Driver-level collection export and import
//!
//! The on-disk layout mirrors what `mongodump` produces for a single
//! database: one `<collection>.bson` file holding the raw concatenated
//! BSON documents plus one `<collection>.metadata.json` file with the
//! index specs. Either restore path can therefore consume either kind
//! of dump.

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Collection, IndexModel};
use mongoferry_types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Index spec as stored in the metadata sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name
    pub name: String,
    /// Key spec document, e.g. `{"email": 1}`
    pub key: Document,
    /// Unique constraint flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

/// Metadata sidecar written next to each `.bson` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Collection name
    #[serde(rename = "collectionName")]
    pub collection_name: String,
    /// Secondary indexes, `_id_` excluded
    pub indexes: Vec<IndexSpec>,
}

impl ExportMetadata {
    fn file_name(collection: &str) -> String {
        format!("{collection}.metadata.json")
    }
}

/// Export one collection into `dir` as `<name>.bson` plus its
/// metadata sidecar. Returns the number of documents written.
pub async fn export_collection(
    collection: &Collection<Document>,
    dir: &Path,
) -> Result<u64> {
    let name = collection.name().to_string();
    let bson_path = dir.join(format!("{name}.bson"));
    debug!(collection = %name, path = %bson_path.display(), "exporting collection");

    let mut file = tokio::fs::File::create(&bson_path).await?;
    let mut cursor = collection
        .find(doc! {})
        .await
        .map_err(|e| Error::copy(&name, 0, format!("export cursor failed: {e}")))?;

    let mut exported: u64 = 0;
    while let Some(document) = cursor
        .try_next()
        .await
        .map_err(|e| Error::copy(&name, 0, format!("export read failed: {e}")))?
    {
        let bytes = mongodb::bson::to_vec(&document)
            .map_err(|e| Error::copy(&name, 0, format!("unserializable document: {e}")))?;
        file.write_all(&bytes).await?;
        exported += 1;
    }
    file.flush().await?;

    let metadata = ExportMetadata {
        collection_name: name.clone(),
        indexes: index_specs(collection, &name).await?,
    };
    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| Error::copy(&name, 0, format!("metadata serialization failed: {e}")))?;
    tokio::fs::write(dir.join(ExportMetadata::file_name(&name)), json).await?;

    info!(collection = %name, exported, "collection exported");
    Ok(exported)
}

/// Import a previously exported collection file into `target`,
/// re-creating its indexes from the metadata sidecar when present.
/// Returns the number of documents inserted.
pub async fn import_collection(
    bson_path: &Path,
    target: &Collection<Document>,
    batch_size: u32,
) -> Result<u64> {
    let name = target.name().to_string();
    let bytes = tokio::fs::read(bson_path).await?;
    let documents = parse_documents(&bytes, &name)?;
    let total = documents.len() as u64;
    debug!(collection = %name, total, "importing collection");

    for (batch_index, batch) in documents.chunks(batch_size.max(1) as usize).enumerate() {
        target
            .insert_many(batch)
            .ordered(true)
            .await
            .map_err(|e| Error::copy(&name, batch_index as u64, e.to_string()))?;
    }

    let metadata_path = metadata_path_for(bson_path);
    if metadata_path.is_file() {
        let json = tokio::fs::read_to_string(&metadata_path).await?;
        let metadata: ExportMetadata = serde_json::from_str(&json)
            .map_err(|e| Error::copy(&name, 0, format!("bad metadata sidecar: {e}")))?;
        for spec in metadata.indexes {
            let mut options = mongodb::options::IndexOptions::builder()
                .name(Some(spec.name))
                .build();
            options.unique = spec.unique;
            let model = IndexModel::builder().keys(spec.key).options(options).build();
            target
                .create_index(model)
                .await
                .map_err(|e| Error::copy(&name, 0, format!("index re-creation failed: {e}")))?;
        }
    }

    info!(collection = %name, total, "collection imported");
    Ok(total)
}

/// Split a concatenated BSON byte stream into documents.
///
/// BSON is self-delimiting: each document starts with its own i32
/// little-endian total length, so no framing beyond concatenation is
/// needed.
pub fn parse_documents(bytes: &[u8], collection: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut reader = std::io::Cursor::new(bytes);
    while (reader.position() as usize) < bytes.len() {
        let document = Document::from_reader(&mut reader)
            .map_err(|e| Error::copy(collection, 0, format!("corrupt export file: {e}")))?;
        documents.push(document);
    }
    Ok(documents)
}

async fn index_specs(collection: &Collection<Document>, name: &str) -> Result<Vec<IndexSpec>> {
    let mut cursor = collection
        .list_indexes()
        .await
        .map_err(|e| Error::copy(name, 0, format!("failed to list indexes: {e}")))?;

    let mut specs = Vec::new();
    while let Some(index) = cursor
        .try_next()
        .await
        .map_err(|e| Error::copy(name, 0, format!("index cursor failed: {e}")))?
    {
        let index_name = index
            .options
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_default();
        if index_name == "_id_" {
            continue;
        }
        let unique = index.options.as_ref().and_then(|o| o.unique);
        specs.push(IndexSpec {
            name: index_name,
            key: index.keys,
            unique,
        });
    }
    Ok(specs)
}

fn metadata_path_for(bson_path: &Path) -> PathBuf {
    let stem = bson_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    bson_path.with_file_name(ExportMetadata::file_name(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenated_documents_round_trip() {
        let docs = vec![
            doc! { "_id": 1, "name": "alpha" },
            doc! { "_id": 2, "name": "beta", "tags": ["x", "y"] },
            doc! { "_id": 3 },
        ];
        let mut bytes = Vec::new();
        for d in &docs {
            bytes.extend(mongodb::bson::to_vec(d).unwrap());
        }
        let parsed = parse_documents(&bytes, "users").unwrap();
        assert_eq!(parsed, docs);
    }

    #[test]
    fn empty_stream_parses_to_no_documents() {
        assert!(parse_documents(&[], "users").unwrap().is_empty());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let bytes = mongodb::bson::to_vec(&doc! { "_id": 1 }).unwrap();
        let err = parse_documents(&bytes[..bytes.len() - 2], "users").unwrap_err();
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn metadata_path_sits_next_to_bson_file() {
        let path = metadata_path_for(Path::new("/tmp/dump/users.bson"));
        assert_eq!(path, Path::new("/tmp/dump/users.metadata.json"));
    }

    #[test]
    fn metadata_serialization_shape() {
        let metadata = ExportMetadata {
            collection_name: "users".into(),
            indexes: vec![IndexSpec {
                name: "email_1".into(),
                key: doc! { "email": 1 },
                unique: Some(true),
            }],
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"collectionName\":\"users\""));
        assert!(json.contains("\"email_1\""));
        let back: ExportMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.indexes.len(), 1);
    }
}
