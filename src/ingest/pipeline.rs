use std::sync::Arc;

use tracing::{debug, info};

use super::{FileRegistry, IngestError, MetadataStore};
use crate::record::Record;
use crate::schema::AttributeSchema;

/// Database and collection the enriched records are written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub db: String,
    pub collection: String,
}

/// Canonical dataset path: `/experiment/processing/tier`
pub fn dataset_path(experiment: &str, processing: &str, tier: &str) -> String {
    format!("/{}/{}/{}", experiment, processing, tier)
}

/// Validates, enriches and stores records
pub struct IngestionPipeline {
    schema: Arc<AttributeSchema>,
    registry: Arc<dyn FileRegistry>,
    store: Arc<dyn MetadataStore>,
    target: StoreTarget,
}

impl IngestionPipeline {
    pub fn new(
        schema: Arc<AttributeSchema>,
        registry: Arc<dyn FileRegistry>,
        store: Arc<dyn MetadataStore>,
        target: StoreTarget,
    ) -> Self {
        Self {
            schema,
            registry,
            store,
            target,
        }
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Ingest one record.
    ///
    /// On success the record carries `dataset` and `did`, and exactly one
    /// upsert has been issued. Calling this twice with the same record issues
    /// two upserts; deduplication is up to the store.
    pub async fn ingest(&self, record: &mut Record) -> Result<(), IngestError> {
        self.schema.validate(record)?;

        let path = string_attr(record, "path")?;
        let experiment = string_attr(record, "experiment")?;
        let processing = string_attr(record, "processing")?;
        let tier = string_attr(record, "tier")?;

        let files = resolve_files(&path);
        let dataset = dataset_path(&experiment, &processing, &tier);
        record.insert("dataset", dataset.as_str());

        let Some(first) = files.first() else {
            return Err(IngestError::NoFilesFound {
                path,
                experiment,
                processing,
                tier,
            });
        };

        debug!(record = ?record, files = ?files, "input data");
        record.insert("path", first.as_str());

        let did = self
            .registry
            .register_files(&experiment, &processing, &tier, &files)
            .await?;
        record.insert("did", did.as_str());

        self.store
            .upsert(
                &self.target.db,
                &self.target.collection,
                std::slice::from_ref(record),
            )
            .await?;

        info!(dataset = %dataset, did = %did, files = files.len(), "record registered");
        Ok(())
    }
}

/// Files associated with a record path.
///
/// The path itself is the only file; there is no directory expansion. A blank
/// path names nothing.
fn resolve_files(path: &str) -> Vec<String> {
    if path.trim().is_empty() {
        return Vec::new();
    }
    vec![path.to_string()]
}

fn string_attr(record: &Record, attr: &str) -> Result<String, IngestError> {
    match record.get(attr) {
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| IngestError::TypeMismatch {
                attr: attr.to_string(),
                found: value.kind().to_string(),
            }),
        None => Err(IngestError::TypeMismatch {
            attr: attr.to_string(),
            found: "nothing".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::schema::SchemaError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRegistry {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl FileRegistry for RecordingRegistry {
        async fn register_files(
            &self,
            experiment: &str,
            processing: &str,
            tier: &str,
            files: &[String],
        ) -> Result<String, IngestError> {
            self.calls
                .lock()
                .unwrap()
                .push((dataset_path(experiment, processing, tier), files.to_vec()));
            Ok("did-1".to_string())
        }
    }

    struct FailingRegistry;

    #[async_trait]
    impl FileRegistry for FailingRegistry {
        async fn register_files(
            &self,
            _experiment: &str,
            _processing: &str,
            _tier: &str,
            _files: &[String],
        ) -> Result<String, IngestError> {
            Err(IngestError::Registration("database is read-only".into()))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<(String, String, Vec<Record>)>>,
        fail: bool,
    }

    #[async_trait]
    impl MetadataStore for RecordingStore {
        async fn upsert(&self, db: &str, collection: &str, records: &[Record]) -> Result<(), IngestError> {
            if self.fail {
                return Err(IngestError::Store("connection refused".into()));
            }
            self.batches
                .lock()
                .unwrap()
                .push((db.to_string(), collection.to_string(), records.to_vec()));
            Ok(())
        }
    }

    fn pipeline_with(
        registry: Arc<dyn FileRegistry>,
        store: Arc<RecordingStore>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            Arc::new(AttributeSchema::new(["experiment", "tier"], ["processing"])),
            registry,
            store,
            StoreTarget {
                db: "meta".into(),
                collection: "records".into(),
            },
        )
    }

    fn sample() -> Record {
        [
            ("path", Value::from("/data/run1/file.root")),
            ("experiment", Value::from("e1")),
            ("processing", Value::from("p1")),
            ("tier", Value::from("t1")),
            ("run", Value::Int(7)),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_ingest_enriches_and_upserts() {
        let registry = Arc::new(RecordingRegistry::default());
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(registry.clone(), store.clone());

        let mut rec = sample();
        pipeline.ingest(&mut rec).await.unwrap();

        assert_eq!(rec.get("dataset"), Some(&Value::from("/e1/p1/t1")));
        assert_eq!(rec.get("did"), Some(&Value::from("did-1")));
        assert_eq!(rec.get("path"), Some(&Value::from("/data/run1/file.root")));

        let calls = registry.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/e1/p1/t1");
        assert_eq!(calls[0].1, vec!["/data/run1/file.root".to_string()]);

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, "meta");
        assert_eq!(batches[0].1, "records");
        assert_eq!(batches[0].2, vec![rec.clone()]);
    }

    #[tokio::test]
    async fn test_dataset_ignores_other_fields() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store);

        let mut rec = sample();
        rec.insert("path", "/elsewhere/other.root");
        rec.insert("dataset", "/stale/value/here");
        pipeline.ingest(&mut rec).await.unwrap();
        assert_eq!(rec.get("dataset"), Some(&Value::from("/e1/p1/t1")));
    }

    #[tokio::test]
    async fn test_ingest_twice_upserts_twice() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store.clone());

        let mut rec = sample();
        pipeline.ingest(&mut rec).await.unwrap();
        pipeline.ingest(&mut rec).await.unwrap();

        assert_eq!(store.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_schema_failure_propagates_unchanged() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store.clone());

        let mut rec: Record = [("experiment", "e1"), ("processing", "p1"), ("path", "/a")]
            .into_iter()
            .collect();
        let err = pipeline.ingest(&mut rec).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Schema(SchemaError::MissingMandatoryAttrs { .. })
        ));
        assert!(store.batches.lock().unwrap().is_empty());
        assert!(rec.get("dataset").is_none());
    }

    #[tokio::test]
    async fn test_non_string_attribute() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store.clone());

        let mut rec = sample();
        rec.insert("tier", Value::Int(3));
        match pipeline.ingest(&mut rec).await.unwrap_err() {
            IngestError::TypeMismatch { attr, found } => {
                assert_eq!(attr, "tier");
                assert_eq!(found, "integer");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_outside_schema_must_still_exist() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store);

        let mut rec: Record = [("experiment", "e1"), ("processing", "p1"), ("tier", "t1")]
            .into_iter()
            .collect();
        assert!(matches!(
            pipeline.ingest(&mut rec).await,
            Err(IngestError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_files_found_skips_store() {
        let registry = Arc::new(RecordingRegistry::default());
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(registry.clone(), store.clone());

        let mut rec = sample();
        rec.insert("path", "  ");
        let err = pipeline.ingest(&mut rec).await.unwrap_err();
        assert!(matches!(err, IngestError::NoFilesFound { .. }));
        assert!(err.to_string().contains("experiment=e1"));

        assert!(registry.calls.lock().unwrap().is_empty());
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registration_failure_skips_store() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline_with(Arc::new(FailingRegistry), store.clone());

        let mut rec = sample();
        assert!(matches!(
            pipeline.ingest(&mut rec).await,
            Err(IngestError::Registration(_))
        ));
        assert!(rec.get("did").is_none());
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let pipeline = pipeline_with(Arc::new(RecordingRegistry::default()), store);

        let mut rec = sample();
        assert!(matches!(
            pipeline.ingest(&mut rec).await,
            Err(IngestError::Store(_))
        ));
    }
}
