//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection. `AppState` is
//! built once at startup and shared read-only through an `Arc`.

use bytes::Bytes;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{CredentialBroker, SessionCodec};
use crate::config::Args;
use crate::db::MongoClient;
use crate::ingest::IngestionPipeline;
use crate::routes::{self, to_boxed, BoxBody};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Session cookie codec
    pub session: SessionCodec,
    /// Kerberos credential broker
    pub broker: CredentialBroker,
    /// Record ingestion pipeline
    pub pipeline: IngestionPipeline,
    /// MongoDB client, when one could be created (used for health reporting)
    pub store: Option<MongoClient>,
}

impl AppState {
    pub fn new(
        args: Args,
        session: SessionCodec,
        broker: CredentialBroker,
        pipeline: IngestionPipeline,
        store: Option<MongoClient>,
    ) -> Self {
        Self {
            args,
            session,
            broker,
            pipeline,
            store,
        }
    }
}

pub async fn run(state: Arc<AppState>) -> crate::Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("datagate listening on {}", state.args.listen);

    if !state.session.is_sealed() {
        warn!("SESSION_SECRET not set - session cookies are not verified");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> Result<Response<BoxBody>, hyper::Error>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state).await,

        (Method::GET, "/") => routes::handle_index(&state, &req),

        (Method::POST, "/login") => routes::handle_login(&state, req).await,

        (Method::POST, "/data") => routes::handle_data(&state, req).await,

        (Method::POST, "/api") => routes::handle_api(&state, req).await,

        _ => routes::not_found_response(&path),
    };

    Ok(to_boxed(response))
}
