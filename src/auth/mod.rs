//! Request authentication
//!
//! Resolves which configured service sent a slash command. Two schemes:
//! - `token`: a shared token in the request body, looked up in the token map
//! - `sig`: an HMAC-SHA256 signature over the timestamp and raw body, checked
//!   against every secret registered for the service
//!
//! Every failure maps to the same public message so callers cannot learn
//! which check rejected them. The precise reason is only logged.

pub mod signature;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

pub use signature::{
    compute_signature, verify_signature, within_replay_window, SIGNATURE_TOLERANCE_SECS,
    SIGNATURE_VERSION,
};

/// Public message for every authentication failure.
pub const AUTH_FAILED_MESSAGE: &str = "Invalid authentication.";

/// Authentication scheme named in the endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Token,
    Signature,
}

impl AuthMethod {
    /// Parse the path segment (`token` or `sig`).
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "token" => Some(AuthMethod::Token),
            "sig" => Some(AuthMethod::Signature),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Token => "token",
            AuthMethod::Signature => "sig",
        }
    }
}

/// Why a request failed authentication. Never shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("service id missing or invalid")]
    InvalidServiceId,
    #[error("unknown authentication method")]
    UnknownMethod,
    #[error("token missing")]
    TokenMissing,
    #[error("token not registered for service")]
    UnknownRequester,
    #[error("timestamp header missing or not an integer")]
    TimestampMissing,
    #[error("timestamp outside replay window")]
    TimestampStale,
    #[error("signature header missing or malformed")]
    SignatureMalformed,
    #[error("no signing secret registered for service")]
    NoSecret,
    #[error("signature mismatch")]
    SignatureMismatch,
}

impl AuthError {
    /// Message returned to the caller, identical for every variant.
    pub fn public_message(self) -> &'static str {
        AUTH_FAILED_MESSAGE
    }
}

/// Credential snapshot consulted for one request.
///
/// Tokens map to the service ids allowed to use them; service ids map to
/// their signing secrets (several secrets allow rotation). Several services
/// may share one secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub tokens: HashMap<String, Vec<String>>,
    pub secrets: HashMap<String, Vec<String>>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.secrets.is_empty()
    }

    /// Allow `token` to authenticate `service_id`.
    pub fn with_token(mut self, token: impl Into<String>, service_id: impl Into<String>) -> Self {
        self.tokens
            .entry(token.into())
            .or_default()
            .push(service_id.into());
        self
    }

    /// Register a signing secret for `service_id`.
    pub fn with_secret(mut self, service_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets
            .entry(service_id.into())
            .or_default()
            .push(secret.into());
        self
    }
}

/// Authentication material extracted from one inbound request.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    /// `service_id` path segment.
    pub service_id: &'a str,
    /// `auth_method` path segment.
    pub auth_method: &'a str,
    /// `token` body field.
    pub token: Option<&'a str>,
    /// Timestamp header.
    pub timestamp: Option<&'a str>,
    /// Signature header.
    pub signature: Option<&'a str>,
    /// Raw request body.
    pub body: &'a [u8],
    /// Current time, epoch seconds.
    pub now: i64,
}

/// Identity resolved for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub service_id: String,
}

/// Timing-safe string equality.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Service ids are non-empty and contain no whitespace or slashes.
pub fn is_valid_service_id(service_id: &str) -> bool {
    !service_id.is_empty()
        && !service_id
            .chars()
            .any(|c| c.is_whitespace() || c == '/')
}

/// Authenticate a request against the credential snapshot.
pub fn authenticate(
    credentials: &Credentials,
    request: &AuthRequest<'_>,
) -> Result<AuthResult, AuthError> {
    let result = authenticate_inner(credentials, request);
    if let Err(reason) = &result {
        debug!(
            target: "auth",
            service_id = %request.service_id,
            method = %request.auth_method,
            %reason,
            "authentication rejected"
        );
    }
    result
}

fn authenticate_inner(
    credentials: &Credentials,
    request: &AuthRequest<'_>,
) -> Result<AuthResult, AuthError> {
    if !is_valid_service_id(request.service_id) {
        return Err(AuthError::InvalidServiceId);
    }

    match AuthMethod::parse(request.auth_method) {
        Some(AuthMethod::Token) => check_token(credentials, request.service_id, request.token)?,
        Some(AuthMethod::Signature) => check_signature(credentials, request)?,
        None => return Err(AuthError::UnknownMethod),
    }

    Ok(AuthResult {
        service_id: request.service_id.to_string(),
    })
}

/// Every configured token is compared so lookup time does not depend on
/// which entry matched.
fn check_token(
    credentials: &Credentials,
    service_id: &str,
    token: Option<&str>,
) -> Result<(), AuthError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::TokenMissing)?;

    let mut services: Option<&Vec<String>> = None;
    for (known, allowed) in &credentials.tokens {
        if timing_safe_eq(known, token) {
            services = Some(allowed);
        }
    }

    match services {
        Some(allowed) if allowed.iter().any(|s| s == service_id) => Ok(()),
        _ => Err(AuthError::UnknownRequester),
    }
}

fn check_signature(credentials: &Credentials, request: &AuthRequest<'_>) -> Result<(), AuthError> {
    let raw_timestamp = request
        .timestamp
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::TimestampMissing)?;
    let timestamp: i64 = raw_timestamp
        .parse()
        .map_err(|_| AuthError::TimestampMissing)?;
    if !within_replay_window(request.now, timestamp) {
        return Err(AuthError::TimestampStale);
    }

    let signature = request
        .signature
        .map(str::trim)
        .filter(|s| signature::has_version_prefix(s))
        .ok_or(AuthError::SignatureMalformed)?;

    let secrets = credentials
        .secrets
        .get(request.service_id)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::NoSecret)?;

    if secrets
        .iter()
        .any(|secret| verify_signature(secret, raw_timestamp, signature, request.body))
    {
        Ok(())
    } else {
        Err(AuthError::SignatureMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn credentials() -> Credentials {
        Credentials::default()
            .with_token("tok-shared", "mattermost")
            .with_token("tok-shared", "slack-a")
            .with_token("tok-solo", "slack-b")
            .with_secret("slack-a", "old-secret")
            .with_secret("slack-a", "new-secret")
            .with_secret("slack-b", "new-secret")
    }

    fn token_request<'a>(service_id: &'a str, token: Option<&'a str>) -> AuthRequest<'a> {
        AuthRequest {
            service_id,
            auth_method: "token",
            token,
            timestamp: None,
            signature: None,
            body: b"",
            now: NOW,
        }
    }

    fn sig_request<'a>(
        service_id: &'a str,
        timestamp: Option<&'a str>,
        signature: Option<&'a str>,
        body: &'a [u8],
    ) -> AuthRequest<'a> {
        AuthRequest {
            service_id,
            auth_method: "sig",
            token: None,
            timestamp,
            signature,
            body,
            now: NOW,
        }
    }

    #[test]
    fn test_auth_method_parse() {
        assert_eq!(AuthMethod::parse("token"), Some(AuthMethod::Token));
        assert_eq!(AuthMethod::parse("sig"), Some(AuthMethod::Signature));
        assert_eq!(AuthMethod::parse("Token"), None);
        assert_eq!(AuthMethod::parse("basic"), None);
        assert_eq!(AuthMethod::Signature.as_str(), "sig");
    }

    #[test]
    fn test_timing_safe_eq() {
        assert!(timing_safe_eq("secret", "secret"));
        assert!(!timing_safe_eq("secret", "secret1"));
        assert!(!timing_safe_eq("secret", "SECRET"));
        assert!(!timing_safe_eq("", "secret"));
        assert!(timing_safe_eq("", ""));
    }

    #[test]
    fn test_is_valid_service_id() {
        assert!(is_valid_service_id("slack-a"));
        assert!(!is_valid_service_id(""));
        assert!(!is_valid_service_id("with space"));
        assert!(!is_valid_service_id("a/b"));
    }

    #[test]
    fn test_token_auth_success() {
        let creds = credentials();
        let result = authenticate(&creds, &token_request("slack-a", Some("tok-shared"))).unwrap();
        assert_eq!(result.service_id, "slack-a");
        let result =
            authenticate(&creds, &token_request("mattermost", Some("tok-shared"))).unwrap();
        assert_eq!(result.service_id, "mattermost");
    }

    #[test]
    fn test_token_auth_wrong_service() {
        let creds = credentials();
        assert_eq!(
            authenticate(&creds, &token_request("slack-a", Some("tok-solo"))),
            Err(AuthError::UnknownRequester)
        );
        assert_eq!(
            authenticate(&creds, &token_request("nobody", Some("tok-shared"))),
            Err(AuthError::UnknownRequester)
        );
    }

    #[test]
    fn test_token_auth_missing_or_unknown_token() {
        let creds = credentials();
        assert_eq!(
            authenticate(&creds, &token_request("slack-a", None)),
            Err(AuthError::TokenMissing)
        );
        assert_eq!(
            authenticate(&creds, &token_request("slack-a", Some(""))),
            Err(AuthError::TokenMissing)
        );
        assert_eq!(
            authenticate(&creds, &token_request("slack-a", Some("tok-nope"))),
            Err(AuthError::UnknownRequester)
        );
    }

    #[test]
    fn test_invalid_service_id_rejected_first() {
        let creds = credentials();
        assert_eq!(
            authenticate(&creds, &token_request("", Some("tok-shared"))),
            Err(AuthError::InvalidServiceId)
        );
    }

    #[test]
    fn test_unknown_method() {
        let creds = credentials();
        let mut req = token_request("slack-a", Some("tok-shared"));
        req.auth_method = "basic";
        assert_eq!(authenticate(&creds, &req), Err(AuthError::UnknownMethod));
    }

    #[test]
    fn test_signature_auth_any_secret_matches() {
        let creds = credentials();
        let body = b"command=%2Fdeploy";
        let ts = NOW.to_string();
        let with_old = compute_signature("old-secret", &ts, body).unwrap();
        let with_new = compute_signature("new-secret", &ts, body).unwrap();
        let with_other = compute_signature("other", &ts, body).unwrap();

        assert!(authenticate(&creds, &sig_request("slack-a", Some(&ts), Some(&with_old), body)).is_ok());
        assert!(authenticate(&creds, &sig_request("slack-a", Some(&ts), Some(&with_new), body)).is_ok());
        // Shared secret authenticates the other service too.
        assert!(authenticate(&creds, &sig_request("slack-b", Some(&ts), Some(&with_new), body)).is_ok());
        assert_eq!(
            authenticate(&creds, &sig_request("slack-a", Some(&ts), Some(&with_other), body)),
            Err(AuthError::SignatureMismatch)
        );
    }

    #[test]
    fn test_signature_auth_replay_window() {
        let creds = credentials();
        let body = b"command=%2Fdeploy";
        for (offset, ok) in [(0, true), (299, true), (-299, true), (300, false), (301, false), (-300, false)] {
            let ts = (NOW - offset).to_string();
            let sig = compute_signature("new-secret", &ts, body).unwrap();
            let result = authenticate(&creds, &sig_request("slack-a", Some(&ts), Some(&sig), body));
            if ok {
                assert!(result.is_ok(), "offset {offset} should pass");
            } else {
                assert_eq!(result, Err(AuthError::TimestampStale), "offset {offset}");
            }
        }
    }

    #[test]
    fn test_signature_auth_header_problems() {
        let creds = credentials();
        let body = b"command=%2Fdeploy";
        let ts = NOW.to_string();
        let sig = compute_signature("new-secret", &ts, body).unwrap();

        assert_eq!(
            authenticate(&creds, &sig_request("slack-a", None, Some(&sig), body)),
            Err(AuthError::TimestampMissing)
        );
        assert_eq!(
            authenticate(&creds, &sig_request("slack-a", Some("yesterday"), Some(&sig), body)),
            Err(AuthError::TimestampMissing)
        );
        assert_eq!(
            authenticate(&creds, &sig_request("slack-a", Some(&ts), None, body)),
            Err(AuthError::SignatureMalformed)
        );
        let unversioned = sig.trim_start_matches("v0=").to_string();
        assert_eq!(
            authenticate(&creds, &sig_request("slack-a", Some(&ts), Some(&unversioned), body)),
            Err(AuthError::SignatureMalformed)
        );
    }

    #[test]
    fn test_signature_auth_no_secret_on_file() {
        let creds = credentials();
        let body = b"command=%2Fdeploy";
        let ts = NOW.to_string();
        let sig = compute_signature("new-secret", &ts, body).unwrap();
        assert_eq!(
            authenticate(&creds, &sig_request("mattermost", Some(&ts), Some(&sig), body)),
            Err(AuthError::NoSecret)
        );
    }

    #[test]
    fn test_signature_auth_tampered_body() {
        let creds = credentials();
        let ts = NOW.to_string();
        let sig = compute_signature("new-secret", &ts, b"command=%2Fdeploy").unwrap();
        assert_eq!(
            authenticate(
                &creds,
                &sig_request("slack-a", Some(&ts), Some(&sig), b"command=%2Fdestroy")
            ),
            Err(AuthError::SignatureMismatch)
        );
    }

    #[test]
    fn test_public_message_is_uniform() {
        let all = [
            AuthError::InvalidServiceId,
            AuthError::UnknownMethod,
            AuthError::TokenMissing,
            AuthError::UnknownRequester,
            AuthError::TimestampMissing,
            AuthError::TimestampStale,
            AuthError::SignatureMalformed,
            AuthError::NoSecret,
            AuthError::SignatureMismatch,
        ];
        for err in all {
            assert_eq!(err.public_message(), AUTH_FAILED_MESSAGE);
        }
    }
}
