//! Error types for datagate
//!
//! Component errors (session, credentials, schema, ingestion) are their own
//! enums; `GatewayError` is what crosses the HTTP boundary, where every
//! variant is rendered as the error page.

use crate::auth::{CredentialError, SessionError};
use crate::ingest::IngestError;

/// Main error type for datagate operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

/// Result type alias for datagate operations
pub type Result<T> = std::result::Result<T, GatewayError>;
