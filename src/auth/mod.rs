//! Authentication for datagate
//!
//! Provides:
//! - Session cookie decoding and issuance (`auth-session`)
//! - Credential brokering over ticket caches, uploaded tickets and passwords

pub mod credentials;
pub mod session;

pub use credentials::{BrokerConfig, CredentialBroker, CredentialError};
pub use session::{cookie_value, split_token, SessionCodec, SessionError, SESSION_COOKIE};
