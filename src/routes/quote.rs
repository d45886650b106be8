use axum::{routing::get, Router};

use crate::handlers::get_quote;
use crate::state::AppState;

pub fn quote_routes() -> Router<AppState> {
    Router::new().route("/quote", get(get_quote))
}
