//! `chantier serve` -- HTTP JSON API server for the Chantier pipeline.
//!
//! Exposes client, quote, stage-history, and audit operations as an async
//! HTTP service using `axum` + `tokio`. Every mutating endpoint runs the
//! stage transition engine inside a single storage snapshot.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication via CHANTIER_API_KEY env var
//!
//! Endpoints:
//! - GET    /health                 - Server status (exempt from auth)
//! - POST   /clients                - Create a client record (lead conversion)
//! - GET    /clients/{id}/quotes    - List a client's quotes
//! - POST   /clients/{id}/quotes    - Create a quote
//! - PATCH  /clients/{id}/quotes    - Patch a quote (body carries devisId)
//! - DELETE /clients/{id}/quotes    - Delete a quote (?devisId=...)
//! - GET    /clients/{id}/history   - Stage duration ledger
//! - GET    /clients/{id}/audit     - Audit trail
//!
//! All responses use Content-Type: application/json with a
//! `{ "success": bool, ... }` envelope.

mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::get;
use axum::{middleware as axum_middleware, Router};
use tower_http::cors::{Any, CorsLayer};

use chantier_storage::MemoryStorage;

use self::handlers::{
    handle_audit, handle_create_client, handle_create_quote, handle_delete_quote, handle_health,
    handle_history, handle_list_quotes, handle_not_found, handle_patch_quote,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
pub use self::state::{AppState, RateLimiter};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default rate limit: 60 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 60;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Build the application router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    // CORS: permissive for local dev; tighten for production.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/clients", axum::routing::post(handle_create_client))
        .route(
            "/clients/{id}/quotes",
            get(handle_list_quotes)
                .post(handle_create_quote)
                .patch(handle_patch_quote)
                .delete(handle_delete_quote),
        )
        .route("/clients/{id}/history", get(handle_history))
        .route("/clients/{id}/audit", get(handle_audit))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on the given port with an in-memory backend.
///
/// Security:
/// - CORS: Permissive (`Any` origin) for local dev.
/// - Rate limit: Per-IP, from `CHANTIER_RATE_LIMIT` (default 60 req/min).
/// - API key: If `CHANTIER_API_KEY` is set, all endpoints except /health
///   require auth.
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let rate_limit = std::env::var("CHANTIER_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    let api_key = std::env::var("CHANTIER_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    tracing::info!("rate limit: {rate_limit} requests per minute per IP");

    let state = Arc::new(AppState {
        storage: MemoryStorage::new(),
        rate_limiter: RateLimiter::new(rate_limit),
        api_key,
    });
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("chantier server listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("received shutdown signal");
}
