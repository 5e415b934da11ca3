//! Common metadata for registry documents
//!
//! Tracks creation and update timestamps.

use bson::{doc, DateTime, Document};
use serde::{Deserialize, Serialize};

/// Common metadata for registry documents
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// When the document was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// When the document was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// `$setOnInsert` fields stamping a new document
    pub fn on_insert(now: DateTime) -> Document {
        doc! { "metadata.created_at": now }
    }

    /// `$set` fields stamping every write
    pub fn on_update(now: DateTime) -> Document {
        doc! { "metadata.updated_at": now }
    }
}
