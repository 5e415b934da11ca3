//! Shared types for datagate

mod error;

pub use error::{GatewayError, Result};
