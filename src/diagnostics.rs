//! Upstream connectivity diagnostics.
//!
//! Answers "why does every upload fail with `NETWORK_ERROR`?" without
//! uploading anything: checks that the API host answers, that the proxy (if
//! any) accepts connections, and that the configured key can list models.

use crate::config::ServerConfig;
use reqwest::{Client, Proxy, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const API_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("pdf2md-server-diagnostics/", env!("CARGO_PKG_VERSION"));

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok(String),
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub outcome: CheckOutcome,
}

/// All checks, in the order they ran.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// Key prefix shown in the report, never the full key.
    pub api_key_hint: Option<String>,
    pub api_base: String,
    pub proxy_url: Option<String>,
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    /// `true` unless some check failed. Skipped checks do not count.
    pub fn all_ok(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| matches!(c.outcome, CheckOutcome::Failed(_)))
    }

    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name).map(|c| &c.outcome)
    }

    fn push(&mut self, name: &'static str, outcome: CheckOutcome) {
        self.checks.push(Check { name, outcome });
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Network diagnostics ===")?;
        writeln!(f, "  API base : {}", self.api_base)?;
        writeln!(
            f,
            "  Proxy    : {}",
            self.proxy_url.as_deref().unwrap_or("not configured")
        )?;
        writeln!(
            f,
            "  API key  : {}",
            self.api_key_hint.as_deref().unwrap_or("not configured")
        )?;
        for check in &self.checks {
            match &check.outcome {
                CheckOutcome::Ok(detail) => writeln!(f, "  ✓ {:<10} {}", check.name, detail)?,
                CheckOutcome::Failed(reason) => writeln!(f, "  ✗ {:<10} {}", check.name, reason)?,
                CheckOutcome::Skipped(reason) => {
                    writeln!(f, "  - {:<10} skipped: {}", check.name, reason)?
                }
            }
        }
        Ok(())
    }
}

/// First ten characters of the key followed by `...`.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(10).collect();
    format!("{prefix}...")
}

/// Run every check against the configured upstream.
pub async fn check_upstream(config: &ServerConfig) -> DiagnosticReport {
    let credentials = &config.credentials;
    let mut report = DiagnosticReport {
        api_key_hint: credentials.api_key.as_deref().map(mask_key),
        api_base: credentials.api_base.clone(),
        proxy_url: config.proxy_url.clone(),
        checks: Vec::new(),
    };

    let base = match Url::parse(&credentials.api_base) {
        Ok(url) => url,
        Err(e) => {
            report.push("api_base", CheckOutcome::Failed(format!("invalid URL: {e}")));
            return report;
        }
    };

    let outcome = match &config.proxy_url {
        Some(proxy) => check_proxy(proxy).await,
        None => CheckOutcome::Skipped("no proxy configured".into()),
    };
    report.push("proxy", outcome);

    let client = match build_client(config.proxy_url.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            report.push("api_base", CheckOutcome::Failed(e));
            return report;
        }
    };

    report.push("api_base", check_reachable(&client, &base).await);

    let outcome = match credentials.api_key.as_deref() {
        Some(key) => check_models(&client, &base, key).await,
        None => CheckOutcome::Skipped("no API key configured".into()),
    };
    report.push("models", outcome);

    report
}

fn build_client(proxy_url: Option<&str>) -> Result<Client, String> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(url) = proxy_url {
        let proxy = Proxy::all(url).map_err(|e| format!("invalid proxy URL: {e}"))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }
    builder.build().map_err(|e| format!("HTTP client: {e}"))
}

/// TCP connect to the proxy's host and port.
async fn check_proxy(proxy: &str) -> CheckOutcome {
    let url = match Url::parse(proxy) {
        Ok(url) => url,
        Err(e) => return CheckOutcome::Failed(format!("invalid proxy URL: {e}")),
    };
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return CheckOutcome::Failed("proxy URL has no host or port".into());
    };
    debug!("diagnostics: connecting to proxy {}:{}", host, port);
    match timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => CheckOutcome::Ok(format!("{host}:{port} accepts connections")),
        Ok(Err(e)) => CheckOutcome::Failed(format!("{host}:{port}: {e}")),
        Err(_) => CheckOutcome::Failed(format!("{host}:{port}: connect timed out")),
    }
}

/// Any HTTP answer from the API host counts as reachable.
async fn check_reachable(client: &Client, base: &Url) -> CheckOutcome {
    match client.get(base.clone()).timeout(CONNECT_TIMEOUT).send().await {
        Ok(resp) => CheckOutcome::Ok(format!(
            "{} answered HTTP {}",
            base.host_str().unwrap_or_default(),
            resp.status().as_u16()
        )),
        Err(e) => CheckOutcome::Failed(describe(&e)),
    }
}

/// `<base>/v1/models`, keeping any path prefix on `base`.
fn models_url(base: &Url) -> Result<Url, String> {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.join("v1/models").map_err(|e| e.to_string())
}

/// Authenticated `GET {base}/v1/models`; only 200 passes.
async fn check_models(client: &Client, base: &Url, api_key: &str) -> CheckOutcome {
    let url = match models_url(base) {
        Ok(url) => url,
        Err(e) => return CheckOutcome::Failed(format!("invalid URL: {e}")),
    };
    let response = client
        .get(url)
        .bearer_auth(api_key)
        .timeout(API_TIMEOUT)
        .send()
        .await;
    match response {
        Ok(resp) if resp.status() == StatusCode::OK => CheckOutcome::Ok("API key accepted".into()),
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            CheckOutcome::Failed(format!("HTTP {status}: {body}"))
        }
        Err(e) => CheckOutcome::Failed(describe(&e)),
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connection error: {err}")
    } else {
        err.to_string()
    }
}
