//! HTTP server for datagate

mod http;

pub use http::{handle_request, run, AppState};
