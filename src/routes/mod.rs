//! HTTP route handlers
//!
//! Handlers are generic over the request body so they can be driven with
//! in-memory bodies as well as hyper's `Incoming`.

pub mod data;
pub mod health;
pub mod page;

pub use data::{handle_api, handle_data, handle_index, handle_login};
pub use health::health_check;
pub use page::{confirm_page, handle_error, login_page, success_page};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::GatewayError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
        }),
    )
}

/// Collect a request body, refusing anything above `limit` bytes
pub async fn read_body<B>(req: Request<B>, limit: usize) -> Result<Bytes, GatewayError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| GatewayError::BadRequest(format!("Failed to read body: {}", e)))
}

/// Decode an `application/x-www-form-urlencoded` body
pub fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_urlencoded::from_bytes(body)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid form: {}", e)))
}

/// Decode a JSON body
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    Ok(serde_json::from_slice(body)?)
}
