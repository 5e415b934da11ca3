//! Login and data registration handlers
//!
//! - `GET /` shows who is logged in, or the login form
//! - `POST /login` exchanges a password for a session cookie
//! - `POST /data` registers a JSON record for a cookie holder
//! - `POST /api` registers a record for programmatic callers, who may present
//!   a base64-encoded ticket cache instead of a cookie

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::{Request, Response};
use serde::Deserialize;
use tracing::{debug, info};

use super::page::{handle_error, login_page, success_page};
use super::{parse_form, parse_json, read_body};
use crate::auth::CredentialError;
use crate::record::Record;
use crate::server::AppState;
use crate::types::GatewayError;

#[derive(Debug, Deserialize)]
struct LoginForm {
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ApiForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ticket: Option<String>,
    record: String,
}

/// A failed request: the page message plus the error behind it
struct Failure {
    message: String,
    error: GatewayError,
}

fn fail<E: Into<GatewayError>>(message: &str) -> impl FnOnce(E) -> Failure + '_ {
    move |e| Failure {
        message: message.to_string(),
        error: e.into(),
    }
}

fn render(outcome: Result<Response<Full<Bytes>>, Failure>) -> Response<Full<Bytes>> {
    outcome.unwrap_or_else(|f| handle_error(&f.message, &f.error))
}

/// Page message for a failed credential exchange
fn credential_message(err: &CredentialError) -> String {
    match err {
        CredentialError::EmptyCredential => "unable to obtain user credentials".to_string(),
        CredentialError::TempFile(msg) => msg.clone(),
        _ => "wrong user credentials".to_string(),
    }
}

pub fn handle_index<B>(state: &AppState, req: &Request<B>) -> Response<Full<Bytes>> {
    match state.session.username(req) {
        Ok(user) => success_page(&format!("logged in as {}", user)),
        Err(e) => {
            debug!(error = %e, "No session, showing login form");
            login_page()
        }
    }
}

pub async fn handle_login<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    render(login(state, req).await)
}

async fn login<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>, Failure>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = read_body(req, state.args.max_body_bytes)
        .await
        .map_err(fail("unable to read request"))?;
    let form: LoginForm = parse_form(&body).map_err(fail("unable to parse login form"))?;

    let creds = match state.broker.from_password(&form.user, &form.password).await {
        Ok(Some(creds)) => creds,
        Ok(None) => return Err(fail("unable to obtain user credentials")(CredentialError::EmptyCredential)),
        Err(e) => {
            let message = credential_message(&e);
            return Err(fail(&message)(e));
        }
    };

    let value = state
        .session
        .issue(&creds.username)
        .map_err(fail("unable to create session"))?;
    let cookie = HeaderValue::from_str(&state.session.set_cookie(&value))
        .map_err(|e| GatewayError::Internal(e.to_string()))
        .map_err(fail("unable to create session"))?;

    info!(principal = %creds.principal(), "User logged in");
    let mut response = success_page(&format!("logged in as {}", creds.username));
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

pub async fn handle_data<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    render(data(state, req).await)
}

async fn data<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>, Failure>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let user = state
        .session
        .username(&req)
        .map_err(fail("unable to authenticate user"))?;
    let body = read_body(req, state.args.max_body_bytes)
        .await
        .map_err(fail("unable to read request"))?;
    let record: Record = parse_json(&body).map_err(fail("unable to parse data record"))?;

    ingest(state, record, &user).await
}

pub async fn handle_api<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    render(api(state, req).await)
}

async fn api<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>, Failure>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let session_user = state.session.username(&req);
    let body = read_body(req, state.args.max_body_bytes)
        .await
        .map_err(fail("unable to read request"))?;
    let form: ApiForm = parse_form(&body).map_err(fail("unable to parse request form"))?;

    let user = match session_user {
        Ok(user) => user,
        Err(e) => {
            debug!(error = %e, "No session, using uploaded ticket");
            let encoded = form
                .ticket
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| GatewayError::BadRequest("no session and no ticket".into()))
                .map_err(fail("unable to authenticate user"))?;
            let ticket = STANDARD
                .decode(encoded.trim())
                .map_err(|e| GatewayError::BadRequest(format!("ticket is not base64: {}", e)))
                .map_err(fail("unable to write kerberos ticket"))?;

            match state.broker.from_uploaded_ticket(&form.name, &ticket).await {
                Ok(creds) => creds.username,
                Err(e) => {
                    let message = credential_message(&e);
                    return Err(fail(&message)(e));
                }
            }
        }
    };

    let record: Record = parse_json(form.record.as_bytes()).map_err(fail("unable to parse data record"))?;
    ingest(state, record, &user).await
}

async fn ingest(state: &AppState, mut record: Record, user: &str) -> Result<Response<Full<Bytes>>, Failure> {
    state
        .pipeline
        .ingest(&mut record)
        .await
        .map_err(fail("unable to insert data"))?;

    let dataset = record.get("dataset").and_then(|v| v.as_str()).unwrap_or_default();
    let did = record.get("did").and_then(|v| v.as_str()).unwrap_or_default();
    info!(user = %user, dataset = %dataset, did = %did, "Registered record for user");
    Ok(success_page(&format!("record registered in dataset {} (did {})", dataset, did)))
}
