//! HTTP entry point for webhook deliveries.
//!
//! # Endpoints
//!
//! - `POST <path>` (default `/api/webhook`) - GitHub webhook deliveries
//! - `GET /health` - returns 200 while the server is running

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::debug;

use crate::dispatch::{DeliveryHeaders, DispatchError, DispatchOutcome, Dispatcher};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Shared application state.
///
/// Cloned into every request; the dispatcher and everything it holds is
/// built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wrap a fully registered dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// The dispatcher serving deliveries.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::MissingHeader(_) | DispatchError::InvalidJson(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::Verification { .. } => StatusCode::UNAUTHORIZED,
            DispatchError::Handler { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Builds the router with the webhook endpoint mounted at `path`.
pub fn build_router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Liveness probe.
pub async fn health_handler() -> &'static str {
    "OK"
}

/// Webhook handler.
///
/// Responds as soon as the delivery is verified and routed; handlers keep
/// running after the response is sent.
///
/// - 200: delivery accepted, ignored (no handler), or a duplicate
/// - 400: missing header or invalid JSON
/// - 401: invalid signature
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match dispatch(&state, &headers, &body) {
        Ok(outcome) => {
            let message = match outcome {
                DispatchOutcome::Spawned(_) => "ok",
                DispatchOutcome::Unrouted => "ignored",
                DispatchOutcome::Duplicate => "duplicate",
            };
            (StatusCode::OK, message).into_response()
        }
        Err(err) => {
            Dispatcher::on_error(&err);
            err.into_response()
        }
    }
}

fn dispatch(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<DispatchOutcome, DispatchError> {
    let event = get_header(headers, HEADER_EVENT)?;
    let delivery_id = get_header(headers, HEADER_DELIVERY)?;
    let signature = get_header(headers, HEADER_SIGNATURE)?;

    debug!(delivery_id = %delivery_id, event = %event, "Received webhook");

    let headers = DeliveryHeaders {
        event,
        delivery_id,
        signature,
    };
    state.dispatcher().receive(headers, body)
}

/// Extracts a required header value as a string.
fn get_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, DispatchError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(DispatchError::MissingHeader(name))
}
