//! Vision-LLM engine backed by `edgequake-pdf2md`.
//!
//! Each page is rasterised and transcribed by a vision model. The provider is
//! built per request from the request's own credentials, so nothing here reads
//! API keys from the process environment.
//!
//! The library folds every per-page upstream failure into
//! [`Pdf2MdError::AllPagesFailed`], keeping only the provider error's text.
//! The adapter recovers the HTTP status from that text so the classifier can
//! tell auth, rate-limit and timeout failures apart.

use super::{ConversionEngine, ConversionRequest, ConversionResult, Page};
use crate::error::EngineError;
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, GeminiProvider, LLMProvider, OpenAIProvider, ProviderFactory, ProviderType,
};
use edgequake_pdf2md::{ConversionConfig, ConversionOutput, Pdf2MdError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used with OpenAI when none is configured.
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// Display prefixes of provider errors that map to an upstream status.
const UPSTREAM_STATUS_MARKERS: &[(&str, u16)] = &[
    ("Authentication error", 401),
    ("Rate limit exceeded", 429),
    ("Request timed out", 408),
];

/// Production engine: rasterise + VLM transcription.
#[derive(Debug, Clone, Default)]
pub struct VisionEngine;

impl VisionEngine {
    pub fn new() -> Self {
        Self
    }

    fn engine_config(request: &ConversionRequest) -> Result<ConversionConfig, EngineError> {
        let mut builder = ConversionConfig::builder()
            .provider(build_provider(request)?)
            .max_retries(request.upstream_retries)
            .api_timeout_secs(request.network_timeout.as_secs().max(1));
        if let Some(model) = &request.model {
            builder = builder.model(model.clone());
        }
        builder.build().map_err(EngineError::from)
    }
}

/// Instantiate the configured provider with the request's API key.
///
/// OpenAI talks to `<api_base>/v1`. Providers without a key-taking
/// constructor here (local ones such as Ollama) fall back to the factory.
fn build_provider(request: &ConversionRequest) -> Result<Arc<dyn LLMProvider>, EngineError> {
    let kind = ProviderType::from_str(&request.provider).ok_or_else(|| {
        EngineError::new(format!("Unknown provider '{}'", request.provider))
    })?;
    let model = request.model.as_deref();

    let provider: Arc<dyn LLMProvider> = match kind {
        ProviderType::OpenAI => Arc::new(
            OpenAIProvider::compatible(request.api_key.clone(), openai_api_url(&request.api_base))
                .with_model(model.unwrap_or(DEFAULT_OPENAI_MODEL)),
        ),
        ProviderType::Anthropic => {
            let provider = AnthropicProvider::new(request.api_key.clone());
            Arc::new(match model {
                Some(m) => provider.with_model(m),
                None => provider,
            })
        }
        ProviderType::Gemini => {
            let provider = GeminiProvider::new(request.api_key.clone());
            Arc::new(match model {
                Some(m) => provider.with_model(m),
                None => provider,
            })
        }
        other => ProviderFactory::create_with_model(other, model)
            .map(|(llm, _embedding)| llm)
            .map_err(|e| {
                EngineError::new(format!(
                    "Provider '{}' is not configured: {e}",
                    request.provider
                ))
                .with_source(e)
            })?,
    };
    debug!(
        "engine: provider {} model {}",
        provider.name(),
        provider.model()
    );
    Ok(provider)
}

/// `<api_base>/v1`, tolerating a trailing slash.
fn openai_api_url(api_base: &str) -> String {
    format!("{}/v1", api_base.trim_end_matches('/'))
}

#[async_trait]
impl ConversionEngine for VisionEngine {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, EngineError> {
        let config = Self::engine_config(request)?;
        let input = request.file_path.to_string_lossy().into_owned();
        let start = Instant::now();

        debug!(
            "engine: converting {} with provider '{}'",
            input, request.provider
        );
        let output = edgequake_pdf2md::convert(&input, &config).await?;
        info!(
            "engine: {} pages from {} in {:?}",
            output.pages.len(),
            request.stored_name,
            start.elapsed()
        );

        let target = markdown_path(&request.output_dir, &request.stored_name);
        if let Err(e) = write_markdown(&target, &output.markdown).await {
            warn!("engine: could not write {}: {}", target.display(), e);
        }

        Ok(pages_from_output(output))
    }
}

/// `<output_dir>/<stored_name>.md`
pub fn markdown_path(output_dir: &Path, stored_name: &str) -> PathBuf {
    output_dir.join(format!("{stored_name}.md"))
}

/// Write via temp file + rename so readers never see a partial file.
async fn write_markdown(path: &Path, markdown: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown).await?;
    tokio::fs::rename(&tmp_path, path).await
}

/// Failed or blank pages become `Page { content: None }`.
fn pages_from_output(output: ConversionOutput) -> ConversionResult {
    let pages = output
        .pages
        .into_iter()
        .map(|page| match page.error {
            Some(err) => {
                warn!("engine: page {} dropped: {}", page.page_num, err);
                Page::empty()
            }
            None if page.markdown.trim().is_empty() => Page::empty(),
            None => Page::new(page.markdown),
        })
        .collect();
    ConversionResult { pages }
}

/// Status implied by a provider error's text, if any.
fn status_from_detail(detail: &str) -> Option<u16> {
    UPSTREAM_STATUS_MARKERS
        .iter()
        .find(|(marker, _)| detail.contains(marker))
        .map(|(_, status)| *status)
}

impl From<Pdf2MdError> for EngineError {
    fn from(err: Pdf2MdError) -> Self {
        let status = match &err {
            Pdf2MdError::AllPagesFailed { first_error, .. } => status_from_detail(first_error),
            Pdf2MdError::RateLimitExceeded { .. } => Some(429),
            Pdf2MdError::AuthError { .. } => Some(401),
            Pdf2MdError::ApiTimeout { .. } => Some(408),
            _ => None,
        };
        let engine_error = EngineError::new(err.to_string());
        let engine_error = match status {
            Some(code) => engine_error.with_status(code),
            None => engine_error,
        };
        engine_error.with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::ServerConfig;
    use crate::error::ErrorCode;
    use crate::pipeline::classify::{classify, is_retryable};

    /// What `convert` returns when every page's upstream call failed.
    fn all_pages_failed(detail: &str) -> EngineError {
        Pdf2MdError::AllPagesFailed {
            total: 3,
            retries: 1,
            first_error: format!("Page 1: LLM call failed after 1 retries: {detail}"),
        }
        .into()
    }

    fn request(provider: &str, model: Option<&str>) -> ConversionRequest {
        let mut builder = ServerConfig::builder()
            .provider(provider)
            .api_base("https://gw.example.com/openai/");
        if let Some(m) = model {
            builder = builder.model(m);
        }
        let config = builder.build().unwrap();
        ConversionRequest::new(&config, "sk-request-key", PathBuf::from("/tmp/a.pdf"), "a.pdf")
    }

    #[test]
    fn upstream_auth_failure_is_auth_error() {
        let e = all_pages_failed("Authentication error: Incorrect API key provided");
        assert_eq!(e.status(), Some(401));
        assert_eq!(classify(&e), ErrorCode::AuthError);
        assert!(!is_retryable(&e));
        assert!(e.message().contains("Incorrect API key provided"));
    }

    #[test]
    fn upstream_rate_limit_is_retried_and_reported() {
        let e = all_pages_failed("Rate limit exceeded: Rate limit reached for gpt-4.1-nano");
        assert_eq!(e.status(), Some(429));
        assert_eq!(classify(&e), ErrorCode::RateLimitError);
        assert!(is_retryable(&e));
    }

    #[test]
    fn upstream_timeout_is_retryable() {
        let e = all_pages_failed("Request timed out");
        assert_eq!(e.status(), Some(408));
        assert!(is_retryable(&e));
    }

    #[test]
    fn upstream_network_failure_keeps_message_without_status() {
        let e = all_pages_failed("Network error: Connection failed: error sending request");
        assert_eq!(e.status(), None);
        assert!(is_retryable(&e));
        assert!(e.message().starts_with("All 3 pages failed"));
    }

    #[test]
    fn typed_library_errors_keep_their_status() {
        let e: EngineError = Pdf2MdError::RateLimitExceeded {
            provider: "openai".into(),
            retry_after_secs: Some(3),
        }
        .into();
        assert_eq!(e.status(), Some(429));

        let e: EngineError = Pdf2MdError::ApiTimeout {
            page: 2,
            elapsed_ms: 120_000,
        }
        .into();
        assert_eq!(e.status(), Some(408));
    }

    #[test]
    fn other_errors_have_no_status() {
        let e: EngineError = Pdf2MdError::LlmApiError {
            message: "socket hang up".into(),
        }
        .into();
        assert_eq!(e.status(), None);
        assert!(e.message().contains("socket hang up"));
    }

    #[test]
    fn openai_provider_uses_request_model() {
        let provider = build_provider(&request("openai", Some("gpt-4.1-mini"))).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4.1-mini");

        let provider = build_provider(&request("openai", None)).unwrap();
        assert_eq!(provider.model(), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = match build_provider(&request("nonesuch", None)) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.message().contains("nonesuch"));
        assert_eq!(classify(&err), ErrorCode::ConversionError);
    }

    #[test]
    fn openai_url_keeps_gateway_prefix() {
        assert_eq!(
            openai_api_url("https://gw.example.com/openai/"),
            "https://gw.example.com/openai/v1"
        );
        assert_eq!(openai_api_url("https://api.openai.com"), "https://api.openai.com/v1");
    }

    #[test]
    fn markdown_lands_next_to_stored_name() {
        let p = markdown_path(Path::new("/srv/output"), "1700000000000-42-report.pdf");
        assert_eq!(p, PathBuf::from("/srv/output/1700000000000-42-report.pdf.md"));
    }

    #[tokio::test]
    async fn markdown_write_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let target = markdown_path(dir.path(), "doc.pdf");
        write_markdown(&target, "# Title\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Title\n");
        assert!(!target.with_extension("md.tmp").exists());
    }
}
