//! Signed-request helpers (`v0` HMAC-SHA256 scheme).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::timing_safe_eq;

type HmacSha256 = Hmac<Sha256>;

/// Signature version prefix.
pub const SIGNATURE_VERSION: &str = "v0";

/// Replay window for signed requests (5 minutes, exclusive).
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Compute the `v0=<hex>` signature header value for a request.
///
/// The signed base string is `v0:{timestamp}:{body}`, using the timestamp
/// exactly as it appeared in the request header.
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{SIGNATURE_VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(format!("{}={}", SIGNATURE_VERSION, hex::encode(digest)))
}

/// Verify a signature header against the raw request body.
pub fn verify_signature(secret: &str, timestamp: &str, signature: &str, body: &[u8]) -> bool {
    match compute_signature(secret, timestamp, body) {
        Some(expected) => timing_safe_eq(&expected, signature),
        None => false,
    }
}

/// Whether `timestamp` lies strictly inside the replay window around `now`.
pub fn within_replay_window(now: i64, timestamp: i64) -> bool {
    let skew = (i128::from(now) - i128::from(timestamp)).abs();
    skew < i128::from(SIGNATURE_TOLERANCE_SECS)
}

/// Whether a signature header carries the supported version tag.
pub fn has_version_prefix(signature: &str) -> bool {
    signature
        .strip_prefix(SIGNATURE_VERSION)
        .is_some_and(|rest| rest.starts_with('='))
}
