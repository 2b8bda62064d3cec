//! Maintenance endpoints behind a shared admin key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/sessions/cleanup", post(cleanup_sessions))
        .route("/admin/sessions", get(list_sessions))
        .route("/admin/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
