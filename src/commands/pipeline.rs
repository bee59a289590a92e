//! One inbound request, start to finish.
//!
//! `ssl_check` probe, authentication, command construction, then routing.
//! Transport concerns (headers, status codes) stay in the server module.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use super::command::{Command, CommandError, TOKEN_FIELD};
use super::dispatch::route;
use super::registry::CommandRegistry;
use super::reply::Outcome;
use crate::auth::{authenticate, AuthError, AuthRequest};
use crate::config::CommandsConfig;

/// Body (or query) field marking a connectivity probe.
pub const SSL_CHECK_FIELD: &str = "ssl_check";

/// Public message for unexpected failures.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error.";

/// Everything the pipeline needs from one HTTP request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub service_id: String,
    pub auth_method: String,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    /// Raw body, exactly as signed.
    pub body: Vec<u8>,
    /// Query string of the request URI, if any.
    pub query: Option<String>,
    /// Current Unix time in seconds.
    pub now: i64,
}

/// Why a request ended without reaching the handlers.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid command: {0}")]
    Invalid(#[from] CommandError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Message returned to the caller. Internal detail is never included.
    pub fn public_message(&self) -> &'static str {
        match self {
            RequestError::Auth(e) => e.public_message(),
            RequestError::Invalid(e) => e.public_message(),
            RequestError::Internal(_) => UNKNOWN_ERROR_MESSAGE,
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body. Repeated keys keep
/// the last value.
pub fn parse_form_fields(body: &[u8]) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

fn is_ssl_check(fields: &BTreeMap<String, String>, query: Option<&str>) -> bool {
    fields.contains_key(SSL_CHECK_FIELD)
        || query.is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == SSL_CHECK_FIELD)
        })
}

/// Authenticate, validate and route one request.
pub fn handle_inbound(
    config: &CommandsConfig,
    registry: &CommandRegistry,
    request: &InboundRequest,
) -> Result<Outcome, RequestError> {
    let fields = parse_form_fields(&request.body);

    if is_ssl_check(&fields, request.query.as_deref()) {
        debug!(target: "commands", service_id = %request.service_id, "ssl_check probe");
        return Ok(Outcome::Empty);
    }

    let auth = authenticate(
        &config.credentials,
        &AuthRequest {
            service_id: &request.service_id,
            auth_method: &request.auth_method,
            token: fields.get(TOKEN_FIELD).map(String::as_str),
            timestamp: request.timestamp.as_deref(),
            signature: request.signature.as_deref(),
            body: &request.body,
            now: request.now,
        },
    )?;

    let mut command = Command::new(fields, auth.service_id)?;
    info!(
        target: "commands",
        service_id = %command.service_id(),
        name = %command.name(),
        delayed = command.can_respond_delayed(),
        "slash command received"
    );

    Ok(route(registry, &mut command, config.help_matcher()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{compute_signature, Credentials, AUTH_FAILED_MESSAGE};
    use crate::commands::reply::Reply;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const NOW: i64 = 1_700_000_000;
    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn config() -> CommandsConfig {
        CommandsConfig::with_credentials(
            Credentials::default()
                .with_token("t0k", "ops")
                .with_secret("ops", "old-secret")
                .with_secret("ops", SECRET),
        )
    }

    fn token_request(service_id: &str, body: &str) -> InboundRequest {
        InboundRequest {
            service_id: service_id.to_string(),
            auth_method: "token".to_string(),
            body: body.as_bytes().to_vec(),
            now: NOW,
            ..Default::default()
        }
    }

    fn signed_request(body: &str, timestamp: i64) -> InboundRequest {
        let ts = timestamp.to_string();
        InboundRequest {
            service_id: "ops".to_string(),
            auth_method: "sig".to_string(),
            signature: compute_signature(SECRET, &ts, body.as_bytes()),
            timestamp: Some(ts),
            body: body.as_bytes().to_vec(),
            now: NOW,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_form_fields() {
        let fields = parse_form_fields(b"command=%2Fdeploy&text=prod+now&text=again&empty=");
        assert_eq!(fields["command"], "/deploy");
        assert_eq!(fields["text"], "again");
        assert_eq!(fields["empty"], "");
    }

    #[test]
    fn test_unknown_ping_with_token() {
        let registry = CommandRegistry::new();
        let outcome = handle_inbound(
            &config(),
            &registry,
            &token_request("ops", "token=t0k&command=%2Fping"),
        )
        .unwrap();
        assert_eq!(
            outcome,
            Outcome::text(
                "Don't know what to do with that command. Type `help` for help.  \nNo help is available."
            )
        );
    }

    #[test]
    fn test_stale_signature_rejected_before_command() {
        let registry = CommandRegistry::new();
        let constructed = Arc::new(Mutex::new(false));
        let flag = constructed.clone();
        registry.on_any_command(move |_, reply| {
            *flag.lock().unwrap() = true;
            reply
        });

        let err = handle_inbound(
            &config(),
            &registry,
            &signed_request("command=%2Fping", NOW - 301),
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::Auth(AuthError::TimestampStale)));
        assert_eq!(err.public_message(), AUTH_FAILED_MESSAGE);
        assert!(!*constructed.lock().unwrap());
    }

    #[test]
    fn test_signed_request_dispatched() {
        let registry = CommandRegistry::new();
        registry.on_command("deploy", |cmd, _| {
            cmd.mark_handled();
            Reply::text(format!("deploying {} for {}", cmd.text(), cmd.service_id()))
        });

        let outcome = handle_inbound(
            &config(),
            &registry,
            &signed_request("command=%2Fdeploy&text=prod", NOW - 299),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::text("deploying prod for ops"));
    }

    #[test]
    fn test_token_never_reaches_handlers() {
        let registry = CommandRegistry::new();
        registry.on_any_command(|cmd, _| {
            assert!(cmd.field("token").is_none());
            cmd.mark_handled();
            Reply::rich(json!({"fields": cmd.data().len()}))
        });

        let outcome = handle_inbound(
            &config(),
            &registry,
            &token_request("ops", "token=t0k&command=%2Fx&user_id=U1"),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Rich(json!({"fields": 2})));
    }

    #[test]
    fn test_token_for_other_service_rejected() {
        let err = handle_inbound(
            &config(),
            &CommandRegistry::new(),
            &token_request("deploy", "token=t0k&command=%2Fx"),
        )
        .unwrap_err();
        assert_eq!(err.public_message(), AUTH_FAILED_MESSAGE);
    }

    #[test]
    fn test_validation_errors_after_auth() {
        let registry = CommandRegistry::new();
        let cases = [
            ("token=t0k&text=x", "Invalid slash command."),
            ("token=t0k&command=%2F", "Empty slash command."),
            (
                "token=t0k&command=%2Fx&response_url=ftp%3A%2F%2Fexample.com%2Fr",
                "Response URL looks malformed.",
            ),
        ];
        for (body, message) in cases {
            let err = handle_inbound(&config(), &registry, &token_request("ops", body)).unwrap_err();
            assert!(matches!(err, RequestError::Invalid(_)));
            assert_eq!(err.public_message(), message);
        }
    }

    #[test]
    fn test_unknown_auth_method() {
        let mut request = token_request("ops", "token=t0k&command=%2Fx");
        request.auth_method = "basic".to_string();
        let err = handle_inbound(&config(), &CommandRegistry::new(), &request).unwrap_err();
        assert!(matches!(err, RequestError::Auth(AuthError::UnknownMethod)));
        assert_eq!(err.public_message(), AUTH_FAILED_MESSAGE);
    }

    #[test]
    fn test_ssl_check_short_circuits_auth() {
        let registry = CommandRegistry::new();
        let outcome = handle_inbound(
            &config(),
            &registry,
            &token_request("nobody", "ssl_check=1&token=wrong"),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Empty);

        let mut request = token_request("nobody", "");
        request.query = Some("ssl_check=1".to_string());
        assert_eq!(
            handle_inbound(&config(), &registry, &request).unwrap(),
            Outcome::Empty
        );
    }

    #[test]
    fn test_internal_error_message() {
        let err = RequestError::Internal("handler task failed".to_string());
        assert_eq!(err.public_message(), "Unknown error.");
    }
}
