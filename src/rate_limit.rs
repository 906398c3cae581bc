//! Per-client fixed-window throttling.
//!
//! Two independent limiters guard the API: a general request counter on every
//! `/api` route and a stricter upload counter on the upload route only. Each
//! client (keyed by source IP) gets a counter that resets when its window
//! elapses. Rejections happen before any body is read.

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Map size above which expired windows are pruned on insert.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window counter keyed by client identity.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    scope: &'static str,
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// `scope` names the limiter in logs and rejection messages.
    pub fn new(scope: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            scope,
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// Record one hit for `key`.
    ///
    /// Returns `Err(retry_after_secs)` when the client has used up its window.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= PRUNE_THRESHOLD && !windows.contains_key(key) {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        if entry.count >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }
        entry.count += 1;
        Ok(())
    }

    /// Hits recorded for `key` in its current window.
    pub fn usage(&self, key: &str) -> u32 {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.get(key).map_or(0, |w| {
            if w.started.elapsed() >= self.window {
                0
            } else {
                w.count
            }
        })
    }

    /// Drop windows that have already expired.
    pub fn prune(&self) {
        let window = self.window;
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, w| w.started.elapsed() < window);
    }
}

/// Client identity: the peer IP, or `unknown` when the server was started
/// without connection info.
pub fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn enforce(
    limiter: &FixedWindowLimiter,
    state: &AppState,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(&req);
    match limiter.check(&key) {
        Ok(()) => next.run(req).await,
        Err(retry_after_secs) => {
            warn!(
                "rate limit ({}) exceeded: {} {} ip={}",
                limiter.scope(),
                req.method(),
                req.uri().path(),
                key
            );
            ApiError::RateLimited {
                scope: limiter.scope(),
                retry_after_secs,
            }
            .render(state.config().environment)
        }
    }
}

/// General request throttle.
pub async fn limit_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(state.request_limiter(), &state, req, next).await
}

/// Upload throttle.
pub async fn limit_uploads(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(state.upload_limiter(), &state, req, next).await
}
