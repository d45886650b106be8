//! Banner and health endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

pub async fn root() -> &'static str {
    "Kibo API Server"
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub realtime_subscribers: usize,
    pub version: String,
}

/// Liveness plus store health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = state.order_service.health_check().await;

    let (status, code) = if store_ok {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            database: if store_ok { "connected" } else { "unreachable" }.to_string(),
            realtime_subscribers: state.change_feed.active_subscriptions(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
