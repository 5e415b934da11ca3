//! MongoDB-backed file registry and metadata store

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use futures::future::try_join_all;
use tracing::debug;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{DatasetDoc, FileDoc, Metadata, DATASET_COLLECTION, FILE_COLLECTION};
use crate::ingest::{dataset_path, FileRegistry, IngestError, MetadataStore};
use crate::record::Record;
use crate::types::GatewayError;

/// Registers files in the `datasets` and `files` collections
#[derive(Clone)]
pub struct MongoFileRegistry {
    datasets: MongoCollection<DatasetDoc>,
    files: MongoCollection<FileDoc>,
}

impl MongoFileRegistry {
    pub fn new(client: &MongoClient) -> Self {
        Self {
            datasets: client.collection(DATASET_COLLECTION),
            files: client.collection(FILE_COLLECTION),
        }
    }

    /// Create the registry's unique indexes
    pub async fn ensure_indexes(&self) -> Result<(), GatewayError> {
        self.datasets.ensure_indexes().await?;
        self.files.ensure_indexes().await
    }
}

fn stamp(set: Document, now: DateTime) -> Document {
    let mut set = set;
    for (key, value) in Metadata::on_update(now) {
        set.insert(key, value);
    }
    doc! { "$set": set, "$setOnInsert": Metadata::on_insert(now) }
}

#[async_trait]
impl FileRegistry for MongoFileRegistry {
    async fn register_files(
        &self,
        experiment: &str,
        processing: &str,
        tier: &str,
        files: &[String],
    ) -> Result<String, IngestError> {
        let dataset = dataset_path(experiment, processing, tier);
        let now = DateTime::now();

        let update = stamp(
            doc! { "experiment": experiment, "processing": processing, "tier": tier },
            now,
        );
        let doc = self
            .datasets
            .upsert_returning(doc! { "dataset": dataset.as_str() }, update)
            .await
            .map_err(|e| IngestError::Registration(e.to_string()))?
            .ok_or_else(|| IngestError::Registration(format!("dataset {} not returned", dataset)))?;
        let dataset_id = doc
            ._id
            .ok_or_else(|| IngestError::Registration(format!("dataset {} has no id", dataset)))?;

        try_join_all(files.iter().map(|path| {
            let update = stamp(doc! { "dataset_id": dataset_id, "dataset": dataset.as_str() }, now);
            self.files.upsert_one(doc! { "path": path.as_str() }, update)
        }))
        .await
        .map_err(|e| IngestError::Registration(e.to_string()))?;

        debug!(dataset = %dataset, files = files.len(), "Registered files");
        Ok(dataset_id.to_hex())
    }
}

/// Upserts records into any database/collection, keyed by `path`
#[derive(Clone)]
pub struct MongoMetadataStore {
    client: MongoClient,
}

impl MongoMetadataStore {
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }
}

/// Filter identifying the stored copy of a record
fn record_filter(record: &Record, doc: &Document) -> Document {
    match record.get("path").and_then(|v| v.as_str()) {
        Some(path) => doc! { "path": path },
        None => doc.clone(),
    }
}

#[async_trait]
impl MetadataStore for MongoMetadataStore {
    async fn upsert(&self, db: &str, collection: &str, records: &[Record]) -> Result<(), IngestError> {
        let coll = self.client.raw_collection(db, collection);
        for record in records {
            let doc = record
                .to_document()
                .map_err(|e| IngestError::Store(e.to_string()))?;
            coll.replace_one(record_filter(record, &doc), doc)
                .upsert(true)
                .await
                .map_err(|e| IngestError::Store(e.to_string()))?;
        }
        Ok(())
    }
}

/// Stand-in used when no MongoDB client could be created at startup.
///
/// Every call fails, so requests get an error page while the gateway keeps
/// serving logins and health checks.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FileRegistry for UnavailableStore {
    async fn register_files(
        &self,
        _experiment: &str,
        _processing: &str,
        _tier: &str,
        _files: &[String],
    ) -> Result<String, IngestError> {
        Err(IngestError::Registration(format!("store unavailable: {}", self.reason)))
    }
}

#[async_trait]
impl MetadataStore for UnavailableStore {
    async fn upsert(&self, _db: &str, _collection: &str, _records: &[Record]) -> Result<(), IngestError> {
        Err(IngestError::Store(format!("store unavailable: {}", self.reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    #[test]
    fn test_record_filter_prefers_path() {
        let record: Record = [("path", "/data/a"), ("tier", "raw")].into_iter().collect();
        let doc = record.to_document().unwrap();
        assert_eq!(record_filter(&record, &doc), doc! { "path": "/data/a" });
    }

    #[test]
    fn test_record_filter_without_path() {
        let mut record = Record::new();
        record.insert("tier", Value::from("raw"));
        let doc = record.to_document().unwrap();
        assert_eq!(record_filter(&record, &doc), doc);
    }

    #[test]
    fn test_stamp_sets_timestamps() {
        let now = DateTime::from_millis(1_700_000_000_000);
        let update = stamp(doc! { "tier": "raw" }, now);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("tier").unwrap(), "raw");
        assert_eq!(set.get_datetime("metadata.updated_at").unwrap(), &now);
        let insert = update.get_document("$setOnInsert").unwrap();
        assert_eq!(insert.get_datetime("metadata.created_at").unwrap(), &now);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = UnavailableStore::new("bad uri");
        let err = store
            .register_files("e1", "p1", "t1", &["/data/a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Registration(m) if m.contains("bad uri")));
        assert!(matches!(
            store.upsert("db", "coll", &[Record::new()]).await,
            Err(IngestError::Store(_))
        ));
    }
}
