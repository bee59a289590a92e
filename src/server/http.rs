//! HTTP server implementation
//!
//! Implements:
//! - Slash command endpoint (POST <namespace>/:service_id/:auth_method)
//! - Namespace index (GET <namespace>, only when `commands.visible`)
//! - Liveness probe (GET /health)

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::commands::{handle_inbound, InboundRequest, Outcome, RequestError};
use crate::commands::{pipeline::UNKNOWN_ERROR_MESSAGE, CommandRegistry};
use crate::config::settings::{normalize_namespace, DEFAULT_MAX_BODY_BYTES, DEFAULT_NAMESPACE};
use crate::config::{ConfigSource, SlashgateConfig};
use crate::logging::redact::RedactedDisplay;

/// Timestamp header for `sig` auth, then the Slack spelling.
pub const TIMESTAMP_HEADERS: &[&str] = &["x-request-timestamp", "x-slack-request-timestamp"];

/// Signature header for `sig` auth, then the Slack spelling.
pub const SIGNATURE_HEADERS: &[&str] = &["x-request-signature", "x-slack-signature"];

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Route layout, fixed when the router is built.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Endpoint namespace (e.g. "/slashgate/v1")
    pub namespace: String,
    /// Max body size for command requests in bytes
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HttpConfig {
    pub fn from_config(config: &SlashgateConfig) -> Self {
        HttpConfig {
            namespace: normalize_namespace(&config.server.namespace),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigSource,
    pub registry: Arc<CommandRegistry>,
    pub http: Arc<HttpConfig>,
    /// Start time (Unix timestamp)
    pub start_time: i64,
}

/// Create the HTTP router with all endpoints
pub fn create_router(
    http: HttpConfig,
    config: ConfigSource,
    registry: Arc<CommandRegistry>,
) -> Router {
    let namespace = normalize_namespace(&http.namespace);
    let max_body_bytes = http.max_body_bytes;

    let state = AppState {
        config,
        registry,
        http: Arc::new(http),
        start_time: chrono::Utc::now().timestamp(),
    };

    let command_router = Router::new()
        .route(
            &format!("{}/:service_id/:auth_method", namespace),
            post(command_handler),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes));

    Router::new()
        .route("/health", get(health_handler))
        .route(&namespace, get(index_handler))
        .merge(command_router)
        .with_state(state)
}

// ============================================================================
// Health Check
// ============================================================================

/// GET /health - Lightweight liveness probe.
async fn health_handler(State(state): State<AppState>) -> Response {
    let uptime = chrono::Utc::now().timestamp() - state.start_time;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": uptime,
        })),
    )
        .into_response()
}

// ============================================================================
// Namespace index
// ============================================================================

/// GET <namespace> - Lists the endpoint patterns when the config allows it.
async fn index_handler(State(state): State<AppState>) -> Response {
    let snapshot = match state.config.snapshot() {
        Ok(s) => s,
        Err(e) => {
            error!(target: "http", "failed to load config: {}", RedactedDisplay(&e));
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    match snapshot.commands.as_ref() {
        Some(commands) if commands.visible => {
            let ns = &state.http.namespace;
            (
                StatusCode::OK,
                Json(json!({
                    "namespace": ns,
                    "endpoints": [
                        format!("{}/{{service_id}}/token", ns),
                        format!("{}/{{service_id}}/sig", ns),
                    ],
                    "helpWord": commands.help_word(),
                    "commands": state.registry.command_names(),
                })),
            )
                .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Slash commands
// ============================================================================

/// POST <namespace>/:service_id/:auth_method
async fn command_handler(
    State(state): State<AppState>,
    Path((service_id, auth_method)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let snapshot = match state.config.snapshot() {
        Ok(s) => s,
        Err(e) => {
            error!(target: "http", "failed to load config: {}", RedactedDisplay(&e));
            return text_response(UNKNOWN_ERROR_MESSAGE);
        }
    };
    if snapshot.commands.is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let request = InboundRequest {
        service_id,
        auth_method,
        timestamp: first_header(&headers, TIMESTAMP_HEADERS),
        signature: first_header(&headers, SIGNATURE_HEADERS),
        body: body.to_vec(),
        query: uri.query().map(str::to_string),
        now: chrono::Utc::now().timestamp(),
    };

    let request_id = Uuid::new_v4();
    let span = info_span!(
        target: "http",
        "slash_command",
        %request_id,
        service_id = %request.service_id,
        method = %request.auth_method
    );

    let registry = state.registry.clone();
    let result = tokio::task::spawn_blocking(move || {
        span.in_scope(|| match snapshot.commands.as_ref() {
            Some(commands) => handle_inbound(commands, &registry, &request),
            None => Err(RequestError::Internal("commands section vanished".to_string())),
        })
    })
    .await
    .unwrap_or_else(|e| Err(RequestError::Internal(format!("handler task failed: {}", e))));

    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(err) => {
            match &err {
                RequestError::Internal(detail) => {
                    error!(target: "http", %request_id, "request failed: {}", detail)
                }
                RequestError::Auth(reason) => {
                    warn!(target: "http", %request_id, "request rejected: {}", reason)
                }
                RequestError::Invalid(reason) => {
                    debug!(target: "http", %request_id, "invalid command: {}", reason)
                }
            }
            text_response(err.public_message())
        }
    }
}

fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Empty => StatusCode::OK.into_response(),
        Outcome::Text(text) => text_response(text),
        Outcome::Rich(value) => (StatusCode::OK, Json(value)).into_response(),
    }
}

/// Chat services only display 200 responses, so every message uses it.
fn text_response(text: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))],
        text.into(),
    )
        .into_response()
}
