//! User and ally application route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me).patch(update_me))
        .route("/users/me/role", post(activate_role))
}

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/ally-applications",
            post(submit_application).get(list_applications),
        )
        .route("/ally-applications/me", get(my_applications))
        .route("/ally-applications/:id/approve", patch(approve_application))
        .route("/ally-applications/:id/reject", patch(reject_application))
}
