//! The conversion engine seam.
//!
//! The service never talks to a model directly. It hands a stored PDF to a
//! [`ConversionEngine`] and receives an ordered list of pages back. The
//! production implementation is [`VisionEngine`]; tests substitute a scripted
//! engine that fails or succeeds on cue.

pub mod vlm;

pub use vlm::VisionEngine;

use crate::config::ServerConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Everything an engine needs for one conversion call.
#[derive(Clone)]
pub struct ConversionRequest {
    /// Stored PDF on local disk.
    pub file_path: PathBuf,
    /// Name the upload was stored under; the raw Markdown lands at
    /// `<output_dir>/<stored_name>.md`.
    pub stored_name: String,
    /// Directory for raw engine output.
    pub output_dir: PathBuf,
    pub api_key: String,
    /// OpenAI-compatible API root, without the `/v1` suffix.
    pub api_base: String,
    pub provider: String,
    pub model: Option<String>,
    /// Per-call upstream timeout.
    pub network_timeout: Duration,
    /// Retries the engine may perform internally per upstream call.
    pub upstream_retries: u32,
}

impl ConversionRequest {
    /// Assemble a request for a stored upload from the service configuration.
    pub fn new(
        config: &ServerConfig,
        api_key: &str,
        file_path: PathBuf,
        stored_name: impl Into<String>,
    ) -> Self {
        Self {
            file_path,
            stored_name: stored_name.into(),
            output_dir: config.output_dir.clone(),
            api_key: api_key.to_string(),
            api_base: config.credentials.api_base.clone(),
            provider: config.credentials.provider.clone(),
            model: config.credentials.model.clone(),
            network_timeout: config.network_timeout,
            upstream_retries: config.upstream_retries,
        }
    }
}

impl std::fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("file_path", &self.file_path)
            .field("stored_name", &self.stored_name)
            .field("output_dir", &self.output_dir)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("network_timeout", &self.network_timeout)
            .field("upstream_retries", &self.upstream_retries)
            .finish()
    }
}

/// One page of engine output. `content` is `None` when the engine produced
/// nothing for the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub content: Option<String>,
}

impl Page {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    pub fn empty() -> Self {
        Self { content: None }
    }
}

/// Ordered engine output.
#[derive(Debug, Clone, Default)]
pub struct ConversionResult {
    pub pages: Vec<Page>,
}

/// A component that turns a stored PDF into per-page Markdown.
///
/// Failures surface as [`EngineError`] with the engine's own message intact
/// so the classifier can read it.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, EngineError>;
}
