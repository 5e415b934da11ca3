//! Health check endpoint
//!
//! `/health` always answers 200 while the process runs. The `store` field
//! reports whether MongoDB answered a ping, so an unreachable database shows
//! up here instead of stopping the gateway.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// "connected", "unreachable" or "disabled"
    pub store: &'static str,
    /// Whether session cookies are sealed
    pub sealed_sessions: bool,
}

pub async fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let store = match &state.store {
        Some(client) => match client.ping().await {
            Ok(()) => "connected",
            Err(e) => {
                debug!(error = %e, "Store ping failed");
                "unreachable"
            }
        },
        None => "disabled",
    };

    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            version: env!("CARGO_PKG_VERSION"),
            store,
            sealed_sessions: state.session.is_sealed(),
        },
    )
}
