//! Order route definitions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

/// Two images at most per request, plus form fields
const UPLOAD_BODY_LIMIT: usize = 6 * 1024 * 1024;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/available", get(list_available_orders))
        .route("/orders/realtime", get(stream_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/realtime", get(stream_order))
        .route("/orders/:id/take", patch(take_order))
        .route("/orders/:id/proof", post(upload_proof))
        .route("/orders/:id/confirm-payment", patch(confirm_payment))
        .route("/orders/:id/cancel", patch(cancel_order))
        .route("/orders/:id/refund", patch(refund_order))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}
