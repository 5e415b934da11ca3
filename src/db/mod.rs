//! Database layer for datagate
//!
//! MongoDB backs both the dataset/file registry and the record metadata
//! store.

pub mod mongo;
pub mod registry;
pub mod schemas;

pub use mongo::{redact_uri, IntoIndexes, MongoClient, MongoCollection};
pub use registry::{MongoFileRegistry, MongoMetadataStore, UnavailableStore};
