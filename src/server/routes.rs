//! Request handlers.

use super::AppState;
use crate::convert::convert_upload;
use crate::error::ApiError;
use crate::pipeline::assemble::ConversionResponse;
use crate::pipeline::intake::{persist, receive_pdf};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// `POST /api/upload`
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let environment = state.config().environment;
    match handle_upload(&state, multipart).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => err.render(environment),
    }
}

async fn handle_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ConversionResponse, ApiError> {
    let started = Instant::now();
    let config = state.config();

    let incoming = receive_pdf(multipart, config.max_file_size).await?;
    let api_key = config.credentials.require_api_key()?;
    info!(
        "upload: received '{}' ({} bytes)",
        incoming.original_name,
        incoming.bytes.len()
    );

    let stored = persist(incoming, &config.upload_dir).await?;
    convert_upload(state.engine(), config, api_key, &stored, started).await
}

/// Liveness probe body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 timestamp of the probe.
    pub timestamp: String,
    /// Seconds since startup.
    pub uptime: f64,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime_secs(),
    })
}

/// Fallback for unmatched routes.
pub async fn not_found(State(state): State<AppState>, uri: Uri) -> Response {
    ApiError::NotFound {
        path: uri.path().to_string(),
    }
    .render(state.config().environment)
}
