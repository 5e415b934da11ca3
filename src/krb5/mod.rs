//! Kerberos plumbing for the credential broker
//!
//! The protocol exchange itself is delegated: ticket caches are read from
//! disk, password logins go through the system `kinit`. Everything the broker
//! needs to decide *whether* a login succeeded lives here:
//! - `krb5.conf` realm configuration parsing
//! - MIT file credential cache (v3/v4) parsing
//! - Ticket clients behind the `KdcConnector` seam

pub mod ccache;
pub mod client;
pub mod config;
pub mod credentials;

pub use ccache::{CCache, CachedCredential, Principal};
pub use client::{
    CacheClient, ClientSettings, KdcConnector, KinitClient, KinitConnector, TicketClient,
};
pub use config::{Krb5Config, RealmEntry};
pub use credentials::Credentials;

use std::path::PathBuf;

/// Errors raised while loading Kerberos material or logging in
#[derive(Debug, thiserror::Error)]
pub enum Krb5Error {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("krb5.conf line {line}: {message}")]
    ConfigParse { line: usize, message: String },

    #[error("invalid credential cache: {0}")]
    CacheFormat(String),

    #[error("unsupported credential cache version 0x{0:04x}")]
    UnsupportedCacheVersion(u16),

    #[error("client not configured: {0}")]
    NotConfigured(String),

    #[error("no valid session: {0}")]
    NoSession(String),

    #[error("kinit failed: {0}")]
    Kinit(String),
}
