use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Session;
use crate::http::server::AppState;
use crate::observability::StatsSnapshot;

#[derive(Serialize)]
pub struct CleanupSummary {
    pub removed: usize,
}

#[derive(Serialize)]
pub struct SessionList {
    pub tenant_id: String,
    pub sessions: Vec<Session>,
}

#[derive(Deserialize)]
pub struct SessionQuery {
    pub tenant_id: Option<String>,
}

type AdminError = (StatusCode, Json<Value>);

fn admin_error(status: StatusCode, message: &str) -> AdminError {
    (status, Json(json!({ "error": message })))
}

pub async fn cleanup_sessions(
    State(state): State<AppState>,
) -> Result<Json<CleanupSummary>, AdminError> {
    let removed = state
        .services
        .sessions
        .cleanup_expired()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session cleanup failed");
            admin_error(StatusCode::INTERNAL_SERVER_ERROR, "session cleanup failed")
        })?;
    Ok(Json(CleanupSummary { removed }))
}

pub async fn get_metrics(State(state): State<AppState>) -> Json<StatsSnapshot> {
    let services = &state.services;
    let mut snapshot = services.stats.snapshot();
    snapshot.connected_credentials = services.tokens.connected_within(services.sessions.ttl());
    snapshot.flagged_users = services.monitor.flagged_users();
    snapshot.rate_limit_fallback_buckets = services.rate_limiter.fallback_len();
    Json(snapshot)
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionList>, AdminError> {
    let tenant_id = query
        .tenant_id
        .filter(|t| !t.is_empty())
        .ok_or_else(|| admin_error(StatusCode::BAD_REQUEST, "tenant_id is required"))?;

    let sessions = state
        .services
        .sessions
        .list_for_tenant(&tenant_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, tenant_id = %tenant_id, "Session listing failed");
            admin_error(StatusCode::INTERNAL_SERVER_ERROR, "session listing failed")
        })?;

    Ok(Json(SessionList {
        tenant_id,
        sessions,
    }))
}
