//! HTTP surface.
//!
//! | Route | |
//! |---|---|
//! | `POST /api/upload` | multipart field `pdf` → Markdown JSON |
//! | `GET /health` | liveness probe |
//! | `GET {public_path}/*` | stored originals, read-only |
//!
//! Everything else is a JSON `NOT_FOUND`.

pub mod routes;
pub mod state;

pub use state::AppState;

use crate::config::{CorsSettings, Environment, ServerConfig};
use crate::engine::ConversionEngine;
use crate::error::ApiError;
use crate::rate_limit::{limit_requests, limit_uploads};
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, HeaderValue, Method, Uri};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the full application router.
pub fn make_app(state: AppState) -> Router {
    let config = state.config().clone();
    let environment = config.environment;

    let upload_route = post(routes::upload)
        .route_layer(from_fn_with_state(state.clone(), limit_uploads))
        .layer(DefaultBodyLimit::max(config.upload_body_limit()));

    let api = Router::new()
        .route("/upload", upload_route)
        .route_layer(from_fn_with_state(state.clone(), limit_requests));

    let missing_upload = move |uri: Uri| async move {
        ApiError::NotFound {
            path: uri.path().to_string(),
        }
        .render(environment)
    };
    let uploads = ServeDir::new(&config.upload_dir).not_found_service(missing_upload.into_service());

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api)
        .nest_service(&config.public_path, uploads)
        .fallback(routes::not_found)
        .layer(CatchPanicLayer::custom(
            move |_: Box<dyn Any + Send + 'static>| panic_response(environment),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors))
        .with_state(state)
}

fn panic_response(environment: Environment) -> Response {
    error!("handler panicked");
    ApiError::Internal("handler panicked".into()).render(environment)
}

fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let settings = settings.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(|o| settings.allows(o))
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Serve `config` with `engine` until Ctrl-C.
pub async fn serve(config: ServerConfig, engine: Arc<dyn ConversionEngine>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("listening on http://{}", listener.local_addr()?);
    let state = AppState::new(Arc::new(config), engine);
    serve_with_shutdown(listener, state, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = make_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!("failed to listen for shutdown signal: {}", e),
    }
}
