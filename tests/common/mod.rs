//! Shared integration-test harness: a real server on a random port backed by a
//! scripted conversion engine.

#![allow(dead_code)]

use async_trait::async_trait;
use pdf2md_server::{
    serve_with_shutdown, AppState, ConversionEngine, ConversionRequest, ConversionResult,
    EngineError, Page, ServerConfig, ServerConfigBuilder,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Minimal bytes that look like a PDF.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << >>\n%%EOF\n";

/// One scripted engine outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Fail(&'static str, Option<u16>),
    Pages(Vec<Option<&'static str>>),
}

/// Engine that replays a script; the last step repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedEngine {
    steps: Vec<Step>,
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn pages(pages: &[&'static str]) -> Arc<Self> {
        Self::new(vec![Step::Pages(pages.iter().map(|p| Some(*p)).collect())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Files the engine was asked to convert, in call order.
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionEngine for ScriptedEngine {
    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, EngineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.file_path.clone());
        assert!(
            request.file_path.exists(),
            "engine called with missing file {}",
            request.file_path.display()
        );
        let step = self
            .steps
            .get(n)
            .or_else(|| self.steps.last())
            .cloned()
            .expect("empty engine script");
        match step {
            Step::Fail(message, Some(status)) => Err(EngineError::new(message).with_status(status)),
            Step::Fail(message, None) => Err(EngineError::new(message)),
            Step::Pages(pages) => Ok(ConversionResult {
                pages: pages
                    .into_iter()
                    .map(|p| Page {
                        content: p.map(str::to_string),
                    })
                    .collect(),
            }),
        }
    }
}

/// Running server with isolated upload and output directories.
///
/// Dropping it shuts the server down and removes the directories.
pub struct TestServer {
    pub base_url: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub client: reqwest::Client,
    _dirs: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawn with test defaults (API key set, 10 ms backoff) adjusted by `customize`.
    pub async fn spawn(
        engine: Arc<dyn ConversionEngine>,
        customize: impl FnOnce(ServerConfigBuilder) -> ServerConfigBuilder,
    ) -> Self {
        let dirs = TempDir::new().expect("temp dir");
        let upload_dir = dirs.path().join("uploads");
        let output_dir = dirs.path().join("output");
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let builder = ServerConfig::builder()
            .host("127.0.0.1")
            .port(0)
            .upload_dir(&upload_dir)
            .output_dir(&output_dir)
            .api_key("sk-test-key")
            .retry_base_delay(Duration::from_millis(10));
        let config = customize(builder).build().expect("valid test config");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{port}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let state = AppState::new(Arc::new(config), engine);
        tokio::spawn(async move {
            serve_with_shutdown(listener, state, async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server error");
        });

        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client");

        Self {
            base_url,
            upload_dir,
            output_dir,
            client,
            _dirs: dirs,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a multipart form to `/api/upload`.
    pub async fn upload_form(&self, form: reqwest::multipart::Form) -> reqwest::Response {
        self.client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .expect("upload request")
    }

    /// POST one PDF in the `pdf` field.
    pub async fn upload_pdf(&self, name: &str, bytes: &[u8]) -> reqwest::Response {
        self.upload_form(pdf_form(name, bytes)).await
    }

    pub fn stored_files(&self) -> Vec<PathBuf> {
        list_files(&self.upload_dir)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub fn file_part(name: &str, bytes: &[u8], mime: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes.to_vec())
        .file_name(name.to_string())
        .mime_str(mime)
        .unwrap()
}

pub fn pdf_form(name: &str, bytes: &[u8]) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part("pdf", file_part(name, bytes, "application/pdf"))
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}
