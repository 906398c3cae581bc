//! Error types for pdf2md-server.
//!
//! Two distinct error types reflect two distinct failure sources:
//!
//! * [`EngineError`]: an opaque failure raised by the conversion engine. It
//!   carries the engine's own message and, when the failure was HTTP-derived,
//!   the upstream status code. Nothing in this crate rewrites it; the
//!   [`crate::pipeline::classify`] stage reads it as-is.
//!
//! * [`ApiError`]: every failure a client can observe. Each variant maps to
//!   exactly one stable [`ErrorCode`] and is rendered as the JSON envelope
//!   `{error, code, details?, debug?}`.

use crate::config::Environment;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Number of error-chain entries included in development debug payloads.
const DEBUG_TRACE_LINES: usize = 5;

// ── Error codes ──────────────────────────────────────────────────────────

/// Stable, client-facing error codes.
///
/// The set is closed: every error response carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoFile,
    FileTooLarge,
    TooManyFiles,
    InvalidFileType,
    ConfigError,
    NetworkError,
    TimeoutError,
    DnsError,
    AuthError,
    RateLimitError,
    ConversionError,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoFile => "NO_FILE",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::TooManyFiles => "TOO_MANY_FILES",
            ErrorCode::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::DnsError => "DNS_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::ConversionError => "CONVERSION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Default HTTP status for this code.
    ///
    /// Upstream failures are all reported as 500.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NoFile
            | ErrorCode::FileTooLarge
            | ErrorCode::TooManyFiles
            | ErrorCode::InvalidFileType => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ConfigError
            | ErrorCode::NetworkError
            | ErrorCode::TimeoutError
            | ErrorCode::DnsError
            | ErrorCode::AuthError
            | ErrorCode::RateLimitError
            | ErrorCode::ConversionError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed user-facing message.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::NoFile => "No file uploaded",
            ErrorCode::FileTooLarge => "File exceeds the maximum upload size",
            ErrorCode::TooManyFiles => "Only one file can be uploaded at a time",
            ErrorCode::InvalidFileType => "Only PDF files are supported",
            ErrorCode::ConfigError => "Server configuration error, please contact the administrator",
            ErrorCode::NetworkError => "Network connection to the conversion service was interrupted",
            ErrorCode::TimeoutError => "The conversion service timed out",
            ErrorCode::DnsError => "Could not resolve the conversion service address",
            ErrorCode::AuthError => "The conversion service rejected the API credentials",
            ErrorCode::RateLimitError => "The conversion service is rate limiting requests",
            ErrorCode::ConversionError => "PDF conversion failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// Optional fixed hint shown below the message.
    pub fn details(&self) -> Option<&'static str> {
        match self {
            ErrorCode::NoFile => Some("Attach a PDF in the 'pdf' form field."),
            ErrorCode::TooManyFiles => Some("Send exactly one file in the 'pdf' form field."),
            ErrorCode::InvalidFileType => Some("The uploaded file must have type application/pdf."),
            ErrorCode::ConfigError => Some("The conversion API key is not configured."),
            ErrorCode::NetworkError => {
                Some("The upstream connection was reset. Please try again shortly.")
            }
            ErrorCode::TimeoutError => {
                Some("Large or complex PDFs take longer; try again or split the document.")
            }
            ErrorCode::DnsError => Some("Check the server's DNS and network configuration."),
            ErrorCode::AuthError => Some("Check the configured API key."),
            ErrorCode::RateLimitError => Some("Please wait a moment and try again."),
            ErrorCode::ConversionError => Some("The file may be corrupted or unsupported."),
            ErrorCode::FileTooLarge | ErrorCode::NotFound | ErrorCode::InternalError => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Engine errors ────────────────────────────────────────────────────────

/// A failure raised by a [`crate::engine::ConversionEngine`].
///
/// Only the engine's message and an optional HTTP status survive the adapter
/// boundary.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Attach the HTTP status the upstream answered with.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

// ── API errors ───────────────────────────────────────────────────────────

/// Every failure observable through the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Intake ────────────────────────────────────────────────────────────
    #[error("no file uploaded")]
    NoFile,

    #[error("file exceeds the {limit}-byte upload limit")]
    FileTooLarge { limit: u64 },

    #[error("more than one file in a single upload")]
    TooManyFiles,

    #[error("unsupported file type '{mime}'")]
    InvalidFileType { mime: String },

    /// The upload could not be written to the upload directory.
    #[error("failed to store upload '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Conversion ────────────────────────────────────────────────────────
    /// The engine failed and retries (if any) are exhausted.
    #[error("{code}: {source}")]
    Conversion {
        code: ErrorCode,
        #[source]
        source: EngineError,
    },

    // ── Guard / routing ───────────────────────────────────────────────────
    #[error("too many {scope}, retry in {retry_after_secs}s")]
    RateLimited {
        scope: &'static str,
        retry_after_secs: u64,
    },

    #[error("no route for '{path}'")]
    NotFound { path: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::NoFile => ErrorCode::NoFile,
            ApiError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            ApiError::TooManyFiles => ErrorCode::TooManyFiles,
            ApiError::InvalidFileType { .. } => ErrorCode::InvalidFileType,
            ApiError::Config(_) => ErrorCode::ConfigError,
            ApiError::Conversion { code, .. } => *code,
            ApiError::RateLimited { .. } => ErrorCode::RateLimitError,
            ApiError::NotFound { .. } => ErrorCode::NotFound,
            ApiError::Storage { .. } | ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // Our own guard, not the upstream's: the client must slow down.
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            other => other.code().status(),
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            ApiError::RateLimited { scope: "uploads", .. } => {
                "Too many uploads, please try again later"
            }
            ApiError::RateLimited { .. } => "Too many requests, please try again later",
            other => other.code().user_message(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::FileTooLarge { limit } => Some(format!(
                "Maximum upload size is {} MB.",
                limit / (1024 * 1024)
            )),
            ApiError::RateLimited {
                retry_after_secs, ..
            } => Some(format!("Retry in {retry_after_secs} seconds.")),
            other => other.code().details().map(str::to_string),
        }
    }

    /// Raw failure details for development builds of the response.
    fn debug_info(&self) -> DebugInfo {
        let status = match self {
            ApiError::Conversion { source, .. } => source.status(),
            _ => None,
        };
        let trace = std::iter::successors(Some(self as &dyn StdError), |&e| e.source())
            .take(DEBUG_TRACE_LINES)
            .map(|e| e.to_string())
            .collect();
        DebugInfo {
            message: self.to_string(),
            code: self.code(),
            status,
            trace,
        }
    }

    /// Build the JSON body. `debug` is only populated outside production.
    pub fn to_body(&self, environment: Environment) -> ErrorBody {
        let code = self.code();
        ErrorBody {
            error: self.user_message().to_string(),
            code,
            details: self.details(),
            debug: (!environment.is_production()).then(|| self.debug_info()),
        }
    }

    /// Render a full HTTP response for the given environment mode.
    pub fn render(&self, environment: Environment) -> Response {
        let mut response = (self.status(), Json(self.to_body(environment))).into_response();
        if let ApiError::RateLimited {
            retry_after_secs, ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Without an explicit environment the safe rendering (no debug payload) is used.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.render(Environment::Production)
    }
}

/// JSON error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// User-facing message.
    pub error: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Development-only diagnostics attached to [`ErrorBody`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Raw error message.
    pub message: String,
    pub code: ErrorCode,
    /// Upstream HTTP status, when the engine reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// First entries of the error source chain, outermost first.
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialise_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::RateLimitError).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_ERROR\"");
        assert_eq!(ErrorCode::InvalidFileType.as_str(), "INVALID_FILE_TYPE");
    }

    #[test]
    fn intake_errors_are_bad_requests() {
        assert_eq!(ApiError::NoFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::FileTooLarge { limit: 10 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::TooManyFiles.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_failure_is_server_error() {
        let e = ApiError::Conversion {
            code: ErrorCode::AuthError,
            source: EngineError::new("Unauthorized").with_status(401),
        };
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code(), ErrorCode::AuthError);
    }

    #[test]
    fn guard_rejection_is_429() {
        let e = ApiError::RateLimited {
            scope: "uploads",
            retry_after_secs: 30,
        };
        assert_eq!(e.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e.code(), ErrorCode::RateLimitError);
        let response = e.render(Environment::Production);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn production_body_has_no_debug() {
        let e = ApiError::Conversion {
            code: ErrorCode::NetworkError,
            source: EngineError::new("socket hang up"),
        };
        let body = e.to_body(Environment::Production);
        assert!(body.debug.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("debug").is_none());
        assert!(!json.to_string().contains("socket hang up"));
    }

    #[test]
    fn development_body_carries_raw_error() {
        let e = ApiError::Conversion {
            code: ErrorCode::RateLimitError,
            source: EngineError::new("Too Many Requests").with_status(429),
        };
        let debug = e.to_body(Environment::Development).debug.unwrap();
        assert!(debug.message.contains("Too Many Requests"));
        assert_eq!(debug.status, Some(429));
        assert_eq!(debug.trace.len(), 2);
        assert!(debug.trace.len() <= DEBUG_TRACE_LINES);
    }

    #[test]
    fn debug_trace_follows_source_chain_and_is_capped() {
        #[derive(Debug, Error)]
        #[error("level {depth}")]
        struct Nested {
            depth: u8,
            #[source]
            inner: Option<Box<Nested>>,
        }
        let chain = (1..=6).rev().fold(None, |inner, depth| {
            Some(Box::new(Nested { depth, inner }))
        });
        let e = ApiError::Conversion {
            code: ErrorCode::ConversionError,
            source: EngineError::new("engine failed").with_source(*chain.unwrap()),
        };
        let trace = e.to_body(Environment::Development).debug.unwrap().trace;
        assert_eq!(trace.len(), DEBUG_TRACE_LINES);
        assert_eq!(trace[1], "engine failed");
        assert_eq!(trace[2], "level 1");
        assert_eq!(trace[4], "level 3");
    }

    #[test]
    fn file_too_large_details_mention_limit() {
        let body = ApiError::FileTooLarge {
            limit: 50 * 1024 * 1024,
        }
        .to_body(Environment::Production);
        assert_eq!(body.code, ErrorCode::FileTooLarge);
        assert!(body.details.unwrap().contains("50 MB"));
    }

    #[test]
    fn engine_error_keeps_message_and_status() {
        let e = EngineError::new("getaddrinfo ENOTFOUND api.openai.com").with_status(503);
        assert_eq!(e.to_string(), "getaddrinfo ENOTFOUND api.openai.com");
        assert_eq!(e.status(), Some(503));
    }
}
