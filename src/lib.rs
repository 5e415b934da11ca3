//! datagate - ticket authenticated data registration gateway
//!
//! Callers authenticate with Kerberos (a password login that yields a session
//! cookie, or an uploaded ticket cache) and submit metadata records. Records
//! are validated against the configured attribute sets, their files are
//! registered under a dataset, and the enriched record is upserted into
//! MongoDB.
//!
//! ## Components
//!
//! - **auth**: session cookies and the credential broker
//! - **krb5**: krb5.conf and ccache parsing, ticket clients
//! - **schema**: mandatory/adjustable attribute validation
//! - **ingest**: the validate, register, upsert pipeline
//! - **db**: MongoDB file registry and metadata store
//! - **routes** / **server**: the hyper HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod ingest;
pub mod krb5;
pub mod logging;
pub mod record;
pub mod routes;
pub mod schema;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
