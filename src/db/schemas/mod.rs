//! Database schemas for datagate
//!
//! MongoDB document structures for the dataset and file registry. Record
//! metadata itself is schemaless and stored as plain documents.

mod dataset;
mod file;
mod metadata;

pub use dataset::{DatasetDoc, DATASET_COLLECTION};
pub use file::{FileDoc, FILE_COLLECTION};
pub use metadata::Metadata;
