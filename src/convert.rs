//! Upload → Markdown orchestration.
//!
//! ```text
//! UploadedFile ─► ConversionRequest ─► retry_with_backoff(engine.convert)
//!                                          │
//!                    ┌─────── Ok ──────────┴───────── Err ───────┐
//!                    ▼                                           ▼
//!            build_response(pages)                remove_upload + classify
//! ```
//!
//! On success the stored original stays on disk so the client can view it via
//! the public path; the janitor reclaims it once the retention window passes.

use crate::config::ServerConfig;
use crate::engine::{ConversionEngine, ConversionRequest};
use crate::error::ApiError;
use crate::janitor::remove_upload;
use crate::pipeline::assemble::{build_response, ConversionResponse};
use crate::pipeline::classify::classify;
use crate::pipeline::intake::UploadedFile;
use crate::pipeline::retry::retry_with_backoff;
use std::time::Instant;
use tracing::{error, info};

/// Convert a stored upload, retrying transient engine failures.
///
/// `started` marks the beginning of the request; the reported processing time
/// runs from there to assembly.
pub async fn convert_upload(
    engine: &dyn ConversionEngine,
    config: &ServerConfig,
    api_key: &str,
    file: &UploadedFile,
    started: Instant,
) -> Result<ConversionResponse, ApiError> {
    let request = ConversionRequest::new(config, api_key, file.path.clone(), &file.filename);

    let outcome = retry_with_backoff(
        |attempt| {
            let request = &request;
            async move {
                info!("convert: {} attempt {}", request.stored_name, attempt);
                engine.convert(request).await
            }
        },
        config.max_retries,
        config.retry_base_delay,
    )
    .await;

    match outcome {
        Ok(result) => {
            let response = build_response(&result.pages, file, &config.public_path, started.elapsed());
            info!(
                "convert: {} done, {} pages in {} ms",
                file.filename, response.metadata.pages, response.metadata.processing_time
            );
            Ok(response)
        }
        Err(source) => {
            let code = classify(&source);
            error!("convert: {} failed with {}: {}", file.filename, code, source);
            remove_upload(&file.path).await;
            Err(ApiError::Conversion { code, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConversionResult, Page};
    use crate::error::{EngineError, ErrorCode};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails with each scripted `(message, status)` in turn, then succeeds.
    struct FailingThenOk {
        failures: Vec<(&'static str, Option<u16>)>,
        calls: AtomicU32,
    }

    impl FailingThenOk {
        fn new(failures: Vec<(&'static str, Option<u16>)>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ConversionEngine for FailingThenOk {
        async fn convert(&self, _: &ConversionRequest) -> Result<ConversionResult, EngineError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some((message, Some(status))) => Err(EngineError::new(*message).with_status(*status)),
                Some((message, None)) => Err(EngineError::new(*message)),
                None => Ok(ConversionResult {
                    pages: vec![Page::new("A"), Page::new("B")],
                }),
            }
        }
    }

    async fn stored_file(dir: &std::path::Path) -> UploadedFile {
        let path = dir.join("1-2-doc.pdf");
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();
        UploadedFile {
            filename: "1-2-doc.pdf".into(),
            original_name: "doc.pdf".into(),
            path,
            mime_type: "application/pdf".into(),
            size: 8,
            created_at: Utc::now(),
        }
    }

    fn config(dir: &std::path::Path) -> ServerConfig {
        ServerConfig::builder()
            .upload_dir(dir)
            .output_dir(dir)
            .retry_base_delay(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn success_keeps_file_and_assembles() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored_file(dir.path()).await;
        let engine = FailingThenOk::new(vec![("connect ETIMEDOUT", None)]);
        let resp = convert_upload(&engine, &config(dir.path()), "sk", &file, Instant::now())
            .await
            .unwrap();
        assert_eq!(resp.markdown, "A\n\nB\n\n");
        assert_eq!(resp.metadata.pages, 2);
        assert_eq!(resp.pdf_url, "/uploads/1-2-doc.pdf");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert!(file.path.exists());
    }

    #[tokio::test]
    async fn exhausted_retries_delete_file_and_classify() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored_file(dir.path()).await;
        let engine = FailingThenOk::new(vec![("socket hang up", None); 5]);
        let err = convert_upload(&engine, &config(dir.path()), "sk", &file, Instant::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let file = stored_file(dir.path()).await;
        let engine = FailingThenOk::new(vec![("Unauthorized", Some(401))]);
        let err = convert_upload(&engine, &config(dir.path()), "sk", &file, Instant::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AuthError);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert!(!file.path.exists());
    }
}
