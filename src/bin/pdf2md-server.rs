//! CLI binary for pdf2md-server.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServerConfig`, installs logging and runs the server.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2md_server::{
    check_upstream, serve, spawn_retention_janitor, CorsSettings, Environment, RateLimitSettings,
    RetentionSettings, ServerConfig, VisionEngine,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Development server on :3001 with permissive CORS for LAN front-ends
  OPENAI_API_KEY=sk-... pdf2md-server --cors-private-network

  # Production behind a proxy
  pdf2md-server --env production --cors-origins https://app.example.com \
      --https-proxy http://127.0.0.1:7890

  # Diagnose upstream connectivity and exit
  pdf2md-server --check-network

ENDPOINTS:
  POST /api/upload        multipart field "pdf" → {markdown, pdfUrl, metadata}
  GET  /health            {status, timestamp, uptime}
  GET  /uploads/<name>    stored originals (path set by --public-path)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for the configured provider (required for uploads)
  OPENAI_API_BASE         OpenAI-compatible API base URL, without /v1
  HTTPS_PROXY             Outbound proxy for upstream calls
  EDGEQUAKE_PROVIDER      Engine provider (default: openai)
  EDGEQUAKE_MODEL         Engine model ID
  PDFIUM_LIB_PATH         Path to libpdfium used for page rasterisation
  RUST_LOG                Overrides --verbose / --quiet
  Every other flag reads PDF2MD_<FLAG>, e.g. PDF2MD_PORT, PDF2MD_MAX_RETRIES.
"#;

/// Upload a PDF, get Markdown back.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-server",
    version,
    about = "HTTP service converting uploaded PDFs to Markdown with Vision LLMs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "PDF2MD_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port.
    #[arg(short, long, env = "PDF2MD_PORT", default_value_t = 3001)]
    port: u16,

    /// Directory for stored uploads.
    #[arg(long, env = "PDF2MD_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for raw engine Markdown output.
    #[arg(long, env = "PDF2MD_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// URL prefix for serving stored uploads.
    #[arg(long, env = "PDF2MD_PUBLIC_PATH", default_value = "/uploads")]
    public_path: String,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "PDF2MD_MAX_FILE_SIZE", default_value_t = 50 * 1024 * 1024)]
    max_file_size: u64,

    /// Per-call upstream timeout in seconds.
    #[arg(long, env = "PDF2MD_NETWORK_TIMEOUT", default_value_t = 120)]
    network_timeout: u64,

    /// Conversion attempts per upload.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Backoff base in milliseconds (doubles per attempt).
    #[arg(long, env = "PDF2MD_RETRY_DELAY", default_value_t = 1000)]
    retry_delay: u64,

    /// Retries the engine performs internally per upstream call.
    #[arg(long, env = "PDF2MD_UPSTREAM_RETRIES", default_value_t = 1)]
    upstream_retries: u32,

    /// Comma-separated allowed origins; `*` allows any.
    #[arg(long, env = "PDF2MD_CORS_ORIGINS", default_value = "")]
    cors_origins: String,

    /// Also allow localhost and private-network origins on any port.
    #[arg(long, env = "PDF2MD_CORS_PRIVATE_NETWORK")]
    cors_private_network: bool,

    /// Rate-limit window in seconds.
    #[arg(long, env = "PDF2MD_RATE_LIMIT_WINDOW", default_value_t = 900)]
    rate_limit_window: u64,

    /// Requests per client per window.
    #[arg(long, env = "PDF2MD_RATE_LIMIT_MAX", default_value_t = 100)]
    rate_limit_max: u32,

    /// Uploads per client per window.
    #[arg(long, env = "PDF2MD_UPLOAD_LIMIT_MAX", default_value_t = 10)]
    upload_limit_max: u32,

    /// Delete uploads older than this many hours.
    #[arg(long, env = "PDF2MD_RETENTION_HOURS", default_value_t = 24)]
    retention_hours: u64,

    /// Minutes between janitor sweeps.
    #[arg(long, env = "PDF2MD_SWEEP_INTERVAL", default_value_t = 60)]
    sweep_interval: u64,

    /// Engine API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Upstream API base URL.
    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com")]
    api_base: String,

    /// Engine provider.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", default_value = "openai")]
    provider: String,

    /// Engine model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Outbound HTTP(S) proxy.
    #[arg(long, env = "HTTPS_PROXY")]
    https_proxy: Option<String>,

    /// Development includes raw errors in responses; production never does.
    #[arg(long = "env", env = "PDF2MD_ENV", value_enum, default_value = "development")]
    environment: EnvArg,

    /// Check upstream connectivity, print a report and exit.
    #[arg(long)]
    check_network: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EnvArg {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl From<EnvArg> for Environment {
    fn from(v: EnvArg) -> Self {
        match v {
            EnvArg::Development => Environment::Development,
            EnvArg::Production => Environment::Production,
        }
    }
}

impl Cli {
    fn to_config(&self) -> Result<ServerConfig> {
        let mut builder = ServerConfig::builder()
            .host(&self.host)
            .port(self.port)
            .upload_dir(&self.upload_dir)
            .output_dir(&self.output_dir)
            .public_path(&self.public_path)
            .max_file_size(self.max_file_size)
            .network_timeout(Duration::from_secs(self.network_timeout))
            .max_retries(self.max_retries)
            .retry_base_delay(Duration::from_millis(self.retry_delay))
            .upstream_retries(self.upstream_retries)
            .cors(CorsSettings::from_list(
                &self.cors_origins,
                self.cors_private_network,
            ))
            .rate_limit(RateLimitSettings {
                window: Duration::from_secs(self.rate_limit_window),
                max_requests: self.rate_limit_max,
                max_uploads: self.upload_limit_max,
            })
            .retention(RetentionSettings {
                max_age: Duration::from_secs(self.retention_hours * 60 * 60),
                sweep_interval: Duration::from_secs(self.sweep_interval * 60),
            })
            .api_base(&self.api_base)
            .provider(&self.provider)
            .environment(self.environment.into());
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(model) = &self.model {
            builder = builder.model(model);
        }
        if let Some(proxy) = &self.https_proxy {
            builder = builder.proxy_url(proxy);
        }
        builder.build().context("Invalid configuration")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.to_config()?;

    // Provider HTTP clients only pick a proxy up from the environment.
    // Export it before any runtime thread exists.
    if let Some(proxy) = &config.proxy_url {
        std::env::set_var("HTTPS_PROXY", proxy);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(run(cli.check_network, config))
}

async fn run(check_network: bool, config: ServerConfig) -> Result<()> {
    // ── Diagnostics mode ─────────────────────────────────────────────────
    if check_network {
        let report = check_upstream(&config).await;
        println!("{report}");
        if !report.all_ok() {
            anyhow::bail!("network check failed");
        }
        return Ok(());
    }

    if config.credentials.api_key.is_none() {
        tracing::warn!("no API key configured; uploads will fail with CONFIG_ERROR");
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    info!("configuration: {:?}", config);

    let janitor = spawn_retention_janitor(&config);

    let result = serve(config, Arc::new(VisionEngine::new()))
        .await
        .context("Server error");
    janitor.abort();
    result
}
