//! Shared application state.

use crate::config::ServerConfig;
use crate::engine::ConversionEngine;
use crate::rate_limit::FixedWindowLimiter;
use std::sync::Arc;
use std::time::Instant;

/// Cheap-to-clone handle to everything request handlers share.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<ServerConfig>,
    engine: Arc<dyn ConversionEngine>,
    request_limiter: FixedWindowLimiter,
    upload_limiter: FixedWindowLimiter,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, engine: Arc<dyn ConversionEngine>) -> Self {
        let limits = &config.rate_limit;
        let request_limiter =
            FixedWindowLimiter::new("requests", limits.max_requests, limits.window);
        let upload_limiter = FixedWindowLimiter::new("uploads", limits.max_uploads, limits.window);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                request_limiter,
                upload_limiter,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &dyn ConversionEngine {
        self.inner.engine.as_ref()
    }

    pub fn request_limiter(&self) -> &FixedWindowLimiter {
        &self.inner.request_limiter
    }

    pub fn upload_limiter(&self) -> &FixedWindowLimiter {
        &self.inner.upload_limiter
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> f64 {
        self.inner.started_at.elapsed().as_secs_f64()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .field("uptime_secs", &self.uptime_secs())
            .finish_non_exhaustive()
    }
}
