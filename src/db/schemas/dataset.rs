//! Dataset document schema
//!
//! One document per `/<experiment>/<processing>/<tier>` triple. Its ObjectId
//! is the identifier handed back to callers as `did`.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for datasets
pub const DATASET_COLLECTION: &str = "datasets";

/// Dataset document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DatasetDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Dataset path, e.g. `/exp1/proc2/raw`
    pub dataset: String,

    pub experiment: String,
    pub processing: String,
    pub tier: String,
}

impl IntoIndexes for DatasetDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "dataset": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("dataset_unique".to_string())
                    .build(),
            ),
        )]
    }
}
