//! File document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for files
pub const FILE_COLLECTION: &str = "files";

/// A file registered under a dataset
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Absolute file path; unique across datasets
    pub path: String,

    /// Owning dataset
    pub dataset_id: ObjectId,

    /// Dataset path, denormalized for lookups
    pub dataset: String,
}

impl IntoIndexes for FileDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "path": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("path_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "dataset_id": 1 },
                Some(IndexOptions::builder().name("dataset_id_index".to_string()).build()),
            ),
        ]
    }
}
