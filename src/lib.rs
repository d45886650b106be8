//! Kibo Backend Library
//!
//! Peer-to-peer fiat to crypto exchange: order lifecycle, realtime order
//! streams, rate quotes, ally onboarding.

pub mod applications;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod orders;
pub mod quote;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod storage;
pub mod users;

use axum::{routing::get, Router};
use std::path::Path;
use tower_http::services::ServeDir;

use middleware::RateLimiter;
use state::AppState;

/// Build the application router with every route and the shared middleware
/// stack. CORS is left to the caller.
pub fn create_app(state: AppState, upload_dir: impl AsRef<Path>, rate_limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(routes::order_routes())
        .merge(routes::quote_routes())
        .merge(routes::user_routes())
        .merge(routes::application_routes())
        .with_state(state)
        .nest_service("/uploads", ServeDir::new(upload_dir.as_ref()))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit,
        ))
}
