//! Configuration for the upload service.
//!
//! All runtime behaviour is controlled through [`ServerConfig`], built once at
//! startup via [`ServerConfigBuilder`] and then shared read-only by every
//! component. Nothing below the binary reads the process environment.

use crate::error::ApiError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default upload cap: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Immutable service configuration.
///
/// # Example
/// ```rust
/// use pdf2md_server::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .port(8080)
///     .max_retries(5)
///     .api_key("sk-test")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// TCP port. Default: 3001.
    pub port: u16,

    /// Where uploaded PDFs are stored. Created on startup if absent.
    pub upload_dir: PathBuf,

    /// Where the engine drops its raw Markdown output. Created on startup if absent.
    pub output_dir: PathBuf,

    /// URL prefix under which stored uploads are served read-only. Default: `/uploads`.
    pub public_path: String,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Network timeout handed to the engine for each upstream call. Default: 120 s.
    pub network_timeout: Duration,

    /// Maximum conversion attempts per upload. Default: 3.
    ///
    /// Counts attempts, not re-attempts: with 3 the engine is called at most
    /// three times.
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts. Default: 1000 ms.
    ///
    /// Attempt `n` failing retryably is followed by a wait of
    /// `retry_base_delay * 2^(n-1)`: 1 s → 2 s → 4 s …
    pub retry_base_delay: Duration,

    /// Retries the engine performs internally per upstream call. Default: 1.
    pub upstream_retries: u32,

    /// Cross-origin policy.
    pub cors: CorsSettings,

    /// Per-client throttling.
    pub rate_limit: RateLimitSettings,

    /// Janitor retention window and sweep cadence.
    pub retention: RetentionSettings,

    /// Engine credentials.
    pub credentials: ApiCredentials,

    /// Outbound HTTP(S) proxy for upstream traffic, e.g. `http://127.0.0.1:7890`.
    pub proxy_url: Option<String>,

    /// Development or production. Gates debug payloads in error responses.
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            public_path: "/uploads".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            network_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            upstream_retries: 1,
            cors: CorsSettings::default(),
            rate_limit: RateLimitSettings::default(),
            retention: RetentionSettings::default(),
            credentials: ApiCredentials::default(),
            proxy_url: None,
            environment: Environment::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("public_path", &self.public_path)
            .field("max_file_size", &self.max_file_size)
            .field("network_timeout", &self.network_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("upstream_retries", &self.upstream_retries)
            .field("cors", &self.cors)
            .field("rate_limit", &self.rate_limit)
            .field("retention", &self.retention)
            .field("credentials", &self.credentials)
            .field("proxy_url", &self.proxy_url)
            .field("environment", &self.environment)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upper bound for a request body on the upload route.
    ///
    /// Multipart framing adds boundaries and headers on top of the file bytes,
    /// so the transport limit sits slightly above `max_file_size`.
    pub fn upload_body_limit(&self) -> usize {
        usize::try_from(self.max_file_size.saturating_add(64 * 1024)).unwrap_or(usize::MAX)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.config.public_path = path.into();
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.config.network_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn upstream_retries(mut self, n: u32) -> Self {
        self.config.upstream_retries = n;
        self
    }

    pub fn cors(mut self, cors: CorsSettings) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn rate_limit(mut self, settings: RateLimitSettings) -> Self {
        self.config.rate_limit = settings;
        self
    }

    pub fn retention(mut self, settings: RetentionSettings) -> Self {
        self.config.retention = settings;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.credentials.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.credentials.api_base = base.into();
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.config.credentials.provider = provider.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.credentials.model = Some(model.into());
        self
    }

    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.config.proxy_url = Some(url.into());
        self
    }

    pub fn environment(mut self, env: Environment) -> Self {
        self.config.environment = env;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ServerConfig, ApiError> {
        let c = &mut self.config;
        if c.max_file_size == 0 {
            return Err(ApiError::Config("max file size must be > 0".into()));
        }
        if c.max_retries == 0 {
            return Err(ApiError::Config(
                "max retries must be ≥ 1 (it counts total attempts)".into(),
            ));
        }
        if !c.public_path.starts_with('/') {
            return Err(ApiError::Config(format!(
                "public path must start with '/', got '{}'",
                c.public_path
            )));
        }
        if c.public_path.len() > 1 {
            let trimmed = c.public_path.trim_end_matches('/').to_string();
            c.public_path = trimmed;
        }
        if c.public_path == "/" || c.public_path == "/api" || c.public_path.starts_with("/api/") {
            return Err(ApiError::Config(format!(
                "public path '{}' would shadow the API routes",
                c.public_path
            )));
        }
        if c.rate_limit.window.is_zero() {
            return Err(ApiError::Config("rate-limit window must be > 0".into()));
        }
        if c.retention.max_age.is_zero() || c.retention.sweep_interval.is_zero() {
            return Err(ApiError::Config(
                "retention window and sweep interval must be > 0".into(),
            ));
        }
        if c.credentials.api_key.as_deref().is_some_and(str::is_empty) {
            c.credentials.api_key = None;
        }
        Ok(self.config)
    }
}

// ── Sub-settings ─────────────────────────────────────────────────────────

/// Development or production mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Error responses include raw error text and the error chain. (default)
    #[default]
    Development,
    /// Error responses contain only the stable code and fixed messages.
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Credentials and model selection for the conversion engine.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    /// API key for the upstream provider. `None` makes every upload fail with `CONFIG_ERROR`.
    pub api_key: Option<String>,
    /// Base URL of the upstream API. Default: `https://api.openai.com`.
    pub api_base: String,
    /// Provider name understood by the engine. Default: `openai`.
    pub provider: String,
    /// Model identifier. `None` uses the engine's default.
    pub model: Option<String>,
}

impl Default for ApiCredentials {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com".to_string(),
            provider: "openai".to_string(),
            model: None,
        }
    }
}

impl ApiCredentials {
    /// The API key, or `CONFIG_ERROR` when none is configured.
    pub fn require_api_key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("conversion API key is not configured".into()))
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

/// Fixed-window throttling thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Window length shared by both counters. Default: 15 minutes.
    pub window: Duration,
    /// General requests per client per window. Default: 100.
    pub max_requests: u32,
    /// Uploads per client per window. Default: 10.
    pub max_uploads: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
            max_uploads: 10,
        }
    }
}

/// Janitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Uploads older than this are deleted by the sweep. Default: 24 hours.
    pub max_age: Duration,
    /// Time between sweeps. Default: 1 hour.
    pub sweep_interval: Duration,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Cross-origin policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsSettings {
    /// Exact origins allowed, e.g. `https://app.example.com`.
    pub allowed_origins: Vec<String>,
    /// Allow any origin.
    pub allow_all: bool,
    /// Allow loopback and RFC 1918 origins on any port (development convenience).
    pub allow_private_network: bool,
}

static RE_PRIVATE_ORIGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(localhost|127(\.\d{1,3}){3}|10(\.\d{1,3}){3}|192\.168(\.\d{1,3}){2}|172\.(1[6-9]|2\d|3[01])(\.\d{1,3}){2})(:\d{1,5})?$",
    )
    .expect("private-origin pattern is valid")
});

impl CorsSettings {
    /// Whether a request `Origin` header value is allowed.
    pub fn allows(&self, origin: &str) -> bool {
        if self.allow_all {
            return true;
        }
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        self.allow_private_network && RE_PRIVATE_ORIGIN.is_match(origin)
    }

    /// Parse a comma-separated origin list, dropping blanks and a `*` entry
    /// (which sets [`CorsSettings::allow_all`] instead).
    pub fn from_list(list: &str, allow_private_network: bool) -> Self {
        let mut settings = CorsSettings {
            allow_private_network,
            ..Default::default()
        };
        for origin in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if origin == "*" {
                settings.allow_all = true;
            } else {
                settings
                    .allowed_origins
                    .push(origin.trim_end_matches('/').to_string());
            }
        }
        settings
    }
}
