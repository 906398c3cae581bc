//! # pdf2md-server
//!
//! HTTP service that turns an uploaded PDF into Markdown.
//!
//! A client posts one PDF; the service stores it, hands it to a Vision-LLM
//! conversion engine, retries transient upstream failures with exponential
//! backoff and answers with the assembled Markdown plus a link to the stored
//! original. Failures come back as JSON with a stable error code.
//!
//! ## Request Flow
//!
//! ```text
//! POST /api/upload
//!  │
//!  ├─ 0. Guard     per-IP fixed-window request + upload limits
//!  ├─ 1. Intake    one `pdf` field, application/pdf, ≤ max size → unique name on disk
//!  ├─ 2. Convert   engine call wrapped in retry (1 s → 2 s → …)
//!  ├─ 3a. Assemble pages joined by blank lines + metadata           → 200
//!  └─ 3b. Classify NETWORK / TIMEOUT / DNS / AUTH / RATE_LIMIT / …  → 500
//!                  (stored file deleted)
//!
//! janitor: every hour, delete uploads and Markdown older than 24 h
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_server::{serve, ServerConfig, VisionEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .port(3001)
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     serve(config, Arc::new(VisionEngine::new())).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod janitor;
pub mod pipeline;
pub mod rate_limit;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ApiCredentials, CorsSettings, Environment, RateLimitSettings, RetentionSettings, ServerConfig,
    ServerConfigBuilder,
};
pub use convert::convert_upload;
pub use diagnostics::{check_upstream, DiagnosticReport};
pub use engine::{ConversionEngine, ConversionRequest, ConversionResult, Page, VisionEngine};
pub use error::{ApiError, EngineError, ErrorBody, ErrorCode};
pub use janitor::{remove_upload, spawn_janitor, spawn_retention_janitor, sweep, SweepReport};
pub use pipeline::assemble::{ConversionResponse, ResponseMetadata};
pub use pipeline::intake::UploadedFile;
pub use pipeline::retry::{retry_with_backoff, RetryPolicy};
pub use server::{make_app, serve, serve_with_shutdown, AppState};
