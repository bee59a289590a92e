//! Delayed responses
//!
//! Chat services hand each command a `response_url` that accepts follow-up
//! messages after the immediate reply. Handlers post to it through a
//! [`DelayedResponder`], either awaiting the result or spawning the delivery
//! onto the runtime and keeping the join handle.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// Timeout for a single delayed delivery.
pub const DELAYED_RESPONSE_TIMEOUT_SECS: u64 = 30;

static DELAYED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DELAYED_RESPONSE_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Delayed response failures, reported to the handler that sent it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelayedResponseError {
    #[error("no URL to which a response can be sent")]
    NoResponseUrl,

    #[error("no async runtime available to send the response")]
    NoRuntime,

    #[error("failed to encode response: {0}")]
    Encode(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("response URL returned HTTP {0}")]
    Status(u16),
}

/// Handle to a spawned delivery.
pub type DelayedDelivery = JoinHandle<Result<StatusCode, DelayedResponseError>>;

/// Posts follow-up messages to a command's response URL.
#[derive(Debug, Clone)]
pub struct DelayedResponder {
    client: reqwest::Client,
    url: Url,
}

impl DelayedResponder {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, DELAYED_CLIENT.clone())
    }

    pub fn with_client(url: Url, client: reqwest::Client) -> Self {
        Self { client, url }
    }

    /// POST a plain-text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<StatusCode, DelayedResponseError> {
        self.post(text.into(), "text/plain; charset=utf-8").await
    }

    /// POST a JSON payload.
    pub async fn send_rich(&self, payload: &Value) -> Result<StatusCode, DelayedResponseError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| DelayedResponseError::Encode(e.to_string()))?;
        self.post(body, "application/json").await
    }

    /// Spawn a plain-text delivery without waiting for it.
    pub fn spawn_text(&self, text: impl Into<String>) -> Result<DelayedDelivery, DelayedResponseError> {
        let runtime = current_runtime()?;
        let responder = self.clone();
        let text = text.into();
        Ok(runtime.spawn(async move { responder.send_text(text).await }))
    }

    /// Spawn a JSON delivery without waiting for it.
    pub fn spawn_rich(&self, payload: Value) -> Result<DelayedDelivery, DelayedResponseError> {
        let runtime = current_runtime()?;
        let responder = self.clone();
        Ok(runtime.spawn(async move { responder.send_rich(&payload).await }))
    }

    async fn post(
        &self,
        body: String,
        content_type: &'static str,
    ) -> Result<StatusCode, DelayedResponseError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "delayed", host = ?self.url.host_str(), "delayed response failed: {}", e);
                DelayedResponseError::Http(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(target: "delayed", status = status.as_u16(), "delayed response delivered");
            Ok(status)
        } else {
            warn!(target: "delayed", status = status.as_u16(), "delayed response rejected");
            Err(DelayedResponseError::Status(status.as_u16()))
        }
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, DelayedResponseError> {
    tokio::runtime::Handle::try_current().map_err(|_| DelayedResponseError::NoRuntime)
}
