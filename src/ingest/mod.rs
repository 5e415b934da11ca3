//! Record ingestion
//!
//! Validates a record, derives its dataset path, registers its files and
//! upserts the enriched record into the metadata store. The registry and the
//! store are traits so the pipeline can run against MongoDB or test doubles.

mod pipeline;

pub use pipeline::{dataset_path, IngestionPipeline, StoreTarget};

use async_trait::async_trait;

use crate::record::Record;
use crate::schema::SchemaError;

/// Ingestion failures. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("attribute '{attr}' must be a string, found {found}")]
    TypeMismatch { attr: String, found: String },

    #[error(
        "No files found associated with path={path}, experiment={experiment}, \
         processing={processing}, tier={tier}"
    )]
    NoFilesFound {
        path: String,
        experiment: String,
        processing: String,
        tier: String,
    },

    #[error("file registration failed: {0}")]
    Registration(String),

    #[error("metadata upsert failed: {0}")]
    Store(String),
}

/// Registers files under a dataset and returns the dataset identifier
#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn register_files(
        &self,
        experiment: &str,
        processing: &str,
        tier: &str,
        files: &[String],
    ) -> Result<String, IngestError>;
}

/// Stores enriched records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn upsert(&self, db: &str, collection: &str, records: &[Record]) -> Result<(), IngestError>;
}
