//! Failure classification.
//!
//! Engine errors are not ours to shape, so both the retry verdict and the
//! user-facing code are derived from the message text and, when present, the
//! upstream HTTP status. All substring matching is case-insensitive.

use crate::error::{EngineError, ErrorCode};

/// Message fragments that mark a failure as transient.
const RETRYABLE_FRAGMENTS: &[&str] = &[
    "socket hang up",
    "econnreset",
    "etimedout",
    "enotfound",
    "econnrefused",
    "getaddrinfo enotfound",
    "timeout",
    "network error",
    "connection error",
];

/// Upstream statuses worth another attempt.
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Ordered message rules; first match wins.
const MESSAGE_RULES: &[(&[&str], ErrorCode)] = &[
    (&["socket hang up", "econnreset"], ErrorCode::NetworkError),
    (&["timeout", "etimedout"], ErrorCode::TimeoutError),
    (&["enotfound", "getaddrinfo"], ErrorCode::DnsError),
];

/// Whether another attempt could plausibly succeed.
pub fn is_retryable(err: &EngineError) -> bool {
    let message = err.message().to_lowercase();
    RETRYABLE_FRAGMENTS.iter().any(|f| message.contains(f))
        || err
            .status()
            .is_some_and(|s| RETRYABLE_STATUSES.contains(&s))
}

/// Map an engine failure to its stable client-facing code.
pub fn classify(err: &EngineError) -> ErrorCode {
    let message = err.message().to_lowercase();
    for (fragments, code) in MESSAGE_RULES {
        if fragments.iter().any(|f| message.contains(f)) {
            return *code;
        }
    }
    match err.status() {
        Some(401) => ErrorCode::AuthError,
        Some(429) => ErrorCode::RateLimitError,
        _ => ErrorCode::ConversionError,
    }
}
