//! JSON-RPC request orchestration.
//!
//! # Pipeline
//! ```text
//! POST /rpc
//!     → origin / host check        (403)
//!     → per-IP budget              (429)
//!     → bearer credential          (401)
//!     → per-user budget            (429)
//!     → envelope decode            (400)
//!     → session validate or bind   (404 / 403)
//!     → method dispatch
//! ```
//!
//! Every stage failure short-circuits. Later stages never run.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::{
    parse_bearer, ConnectionContext, Session, SessionError, TokenError, TokenValidator,
};
use crate::capabilities::CapabilityRegistry;
use crate::error::GatewayError;
use crate::http::response::{preflight, RpcReply, RpcRequest, X_SESSION_ID};
use crate::http::server::{AppState, Services};
use crate::observability::metrics;
use crate::security::sanitizer::sanitize_map;
use crate::security::{sanitize, RateLimitDecision};
use crate::workflow::{Caller, ExecutionContext, ExecutionError, GraphExecutor};

pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// A pipeline failure and the budget headers it should carry.
struct Rejection {
    error: GatewayError,
    rate_limit: Option<RateLimitDecision>,
}

impl Rejection {
    fn new(error: impl Into<GatewayError>, rate_limit: Option<RateLimitDecision>) -> Self {
        Self {
            error: error.into(),
            rate_limit,
        }
    }

    fn limited(scope: &'static str, decision: RateLimitDecision) -> Self {
        Self::new(GatewayError::RateLimited { scope }, Some(decision))
    }
}

struct Admitted {
    ctx: ConnectionContext,
    rate_limit: RateLimitDecision,
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_id(headers: &HeaderMap) -> &str {
    header_str(headers, "x-request-id").unwrap_or("unknown")
}

/// Low-cardinality method label.
fn method_label(method: &str) -> &'static str {
    match method {
        "initialize" => "initialize",
        "ping" => "ping",
        "tools/list" => "tools/list",
        "tools/call" => "tools/call",
        "workflows/list" => "workflows/list",
        "workflows/execute" => "workflows/execute",
        _ => "other",
    }
}

/// Origin check shared by every `/rpc` verb. Returns the origin to reflect.
fn check_origin<'a>(
    state: &AppState,
    headers: &'a HeaderMap,
    uri: &Uri,
) -> Result<Option<&'a str>, GatewayError> {
    let settings = state.inner.load_full();
    settings
        .origin_guard
        .check_headers(headers, uri.authority().map(|a| a.as_str()))
        .map_err(|rejection| {
            tracing::warn!(
                request_id = %request_id(headers),
                reason = %rejection,
                "Origin rejected"
            );
            GatewayError::from(rejection)
        })
}

/// IP budget, credential, user budget.
async fn admit(
    services: &Services,
    peer: SocketAddr,
    headers: &HeaderMap,
) -> Result<Admitted, Rejection> {
    let ip_budget = services.rate_limiter.check_ip(peer.ip()).await;
    if !ip_budget.allowed {
        return Err(Rejection::limited("ip", ip_budget));
    }

    let ctx = authenticate(services, headers)
        .await
        .map_err(|e| Rejection::new(e, None))?;

    let user_budget = services.rate_limiter.check_user(&ctx.user_id).await;
    if !user_budget.allowed {
        return Err(Rejection::limited("user", user_budget));
    }

    Ok(Admitted {
        ctx,
        rate_limit: user_budget,
    })
}

async fn authenticate(
    services: &Services,
    headers: &HeaderMap,
) -> Result<ConnectionContext, GatewayError> {
    let bearer = parse_bearer(header_str(headers, header::AUTHORIZATION))?;
    match services.tokens.validate(bearer).await {
        Ok(ctx) => Ok(ctx),
        Err(e) => {
            if let TokenError::MembershipRevoked {
                connection_id,
                user_id,
            } = &e
            {
                if let Err(cleanup) = services
                    .sessions
                    .invalidate_connection(user_id, connection_id)
                    .await
                {
                    tracing::warn!(error = %cleanup, "Failed to drop sessions of revoked credential");
                }
            }
            Err(e.into())
        }
    }
}

/// Validate and extend the presented session, or bind one.
async fn resolve_session(
    services: &Services,
    headers: &HeaderMap,
    ctx: &ConnectionContext,
) -> Result<Session, GatewayError> {
    match header_str(headers, X_SESSION_ID).filter(|s| !s.is_empty()) {
        Some(session_id) => {
            let session = services.sessions.validate(session_id, ctx).await?;
            // expired between validate and extend
            if !services.sessions.extend(&session).await? {
                return Err(SessionError::NotFound.into());
            }
            Ok(session)
        }
        None => {
            let session = services.sessions.bind(ctx).await?;
            services.stats.record_session_bound();
            Ok(session)
        }
    }
}

/// Count, log and time one finished request.
fn finish(
    services: &Services,
    headers: &HeaderMap,
    id: Value,
    method: &'static str,
    started: Instant,
    outcome: Result<RpcReply, Rejection>,
    cors_origin: Option<&str>,
) -> Response {
    let reply = match outcome {
        Ok(reply) => {
            metrics::record_request(method, "ok", started);
            reply
        }
        Err(rejection) => {
            let error = rejection.error;
            services.stats.record_rpc_error();
            metrics::record_rpc_error(error.code());
            match &error {
                GatewayError::Token(e) => {
                    services.stats.record_auth_failure();
                    metrics::record_auth_failure(e.kind());
                }
                GatewayError::RateLimited { scope } => {
                    services.stats.record_rate_limited();
                    metrics::record_rate_limited(*scope);
                }
                _ => {}
            }
            if error.http_status() == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(request_id = %request_id(headers), method, error = %error, "RPC failed");
            } else {
                tracing::debug!(request_id = %request_id(headers), method, error = %error, "RPC rejected");
            }
            metrics::record_request(method, error.kind(), started);

            let reply = RpcReply::error(id, &error);
            match rejection.rate_limit {
                Some(decision) => reply.with_rate_limit(&decision),
                None => reply,
            }
        }
    };
    reply.with_cors(cors_origin).into_response()
}

/// `POST /rpc`
pub async fn handle_rpc(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let services = state.services.as_ref();
    services.stats.record_request();

    let request = RpcRequest::parse(&body);
    let id = request.as_ref().map(|r| r.id.clone()).unwrap_or(Value::Null);
    let method = request
        .as_ref()
        .map(|r| method_label(r.method()))
        .unwrap_or("invalid");

    let cors_origin = match check_origin(&state, &headers, &uri) {
        Ok(origin) => origin,
        Err(e) => {
            let rejection = Rejection::new(e, None);
            return finish(services, &headers, id, method, started, Err(rejection), None);
        }
    };

    let outcome = async {
        let admitted = admit(services, peer, &headers).await?;
        let limit = Some(admitted.rate_limit);
        let request = request.map_err(|e| Rejection::new(e, limit))?;
        let session = resolve_session(services, &headers, &admitted.ctx)
            .await
            .map_err(|e| Rejection::new(e, limit))?;

        tracing::debug!(
            request_id = %request_id(&headers),
            method = %request.method(),
            user_id = %admitted.ctx.user_id,
            tenant_id = %admitted.ctx.tenant_id,
            "Dispatching RPC"
        );
        let result = dispatch(services, &admitted.ctx, &request)
            .await
            .map_err(|e| Rejection::new(e, limit))?;

        Ok::<_, Rejection>(
            RpcReply::success(request.id.clone(), result)
                .with_session(&session.session_id)
                .with_rate_limit(&admitted.rate_limit),
        )
    }
    .await;

    finish(services, &headers, id, method, started, outcome, cors_origin)
}

/// `DELETE /rpc`: explicit logout of the presented session.
pub async fn handle_logout(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let services = state.services.as_ref();
    services.stats.record_request();

    let cors_origin = match check_origin(&state, &headers, &uri) {
        Ok(origin) => origin,
        Err(e) => {
            let rejection = Rejection::new(e, None);
            return finish(services, &headers, Value::Null, "logout", started, Err(rejection), None);
        }
    };

    let outcome = async {
        let admitted = admit(services, peer, &headers).await?;
        let limit = Some(admitted.rate_limit);
        let session_id = header_str(&headers, X_SESSION_ID)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Rejection::new(GatewayError::InvalidRequest("missing x-session-id".into()), limit)
            })?;

        let session = services
            .sessions
            .validate(session_id, &admitted.ctx)
            .await
            .map_err(|e| Rejection::new(e, limit))?;
        let removed = services
            .sessions
            .invalidate(&session.session_id, &admitted.ctx.user_id)
            .await
            .map_err(|e| Rejection::new(e, limit))?;

        Ok::<_, Rejection>(
            RpcReply::success(Value::Null, json!({ "logged_out": removed }))
                .with_rate_limit(&admitted.rate_limit),
        )
    }
    .await;

    finish(services, &headers, Value::Null, "logout", started, outcome, cors_origin)
}

/// `OPTIONS /rpc`: preflight reflecting exactly the validated origin.
pub async fn handle_preflight(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match check_origin(&state, &headers, &uri) {
        Ok(Some(origin)) => preflight(origin),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    graph_id: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

fn decode_params<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T, GatewayError> {
    let params = if params.is_null() {
        Value::Object(Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| GatewayError::InvalidParams(e.to_string()))
}

async fn dispatch(
    services: &Services,
    ctx: &ConnectionContext,
    request: &RpcRequest,
) -> Result<Value, GatewayError> {
    match request.method() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {}, "workflows": {} },
            "tenant_id": ctx.tenant_id,
        })),

        "ping" => Ok(json!({})),

        "tools/list" => {
            let registry = CapabilityRegistry::new(services.capability_settings.clone());
            Ok(json!({ "tools": registry.list() }))
        }

        "tools/call" => {
            let params: ToolCallParams = decode_params(&request.params)?;
            let checked = sanitize(&Value::Object(params.arguments));
            if !checked.is_clean() {
                services.monitor.record(&ctx.user_id, &checked.removed_keys);
                return Err(GatewayError::SanitizationRejected(checked.removed_keys));
            }

            let mut registry = CapabilityRegistry::new(services.capability_settings.clone());
            let handler = registry.resolve(&params.name).map_err(|e| {
                ExecutionError::UnregisteredCapability {
                    step_id: params.name.clone(),
                    capability: e.0,
                }
            })?;

            let exec_ctx = ExecutionContext {
                step_id: params.name.clone(),
                tenant_id: ctx.tenant_id.clone(),
                user_id: ctx.user_id.clone(),
                ..ExecutionContext::default()
            };
            let output = handler
                .invoke(checked.value, &exec_ctx)
                .await
                .map_err(|source| ExecutionError::StepFailed {
                    step_id: params.name.clone(),
                    source,
                })?;
            Ok(json!({ "output": sanitize(&output).value }))
        }

        "workflows/list" => {
            let workflows = services
                .graphs
                .list_graphs(&ctx.tenant_id)
                .await
                .map_err(ExecutionError::from)?;
            Ok(json!({ "workflows": workflows }))
        }

        "workflows/execute" => {
            let params: ExecuteParams = decode_params(&request.params)?;
            let (parameters, removed) = sanitize_map(&params.parameters);
            services.monitor.record(&ctx.user_id, &removed);

            let caller = Caller {
                tenant_id: ctx.tenant_id.clone(),
                user_id: ctx.user_id.clone(),
            };
            let mut executor =
                GraphExecutor::new(CapabilityRegistry::new(services.capability_settings.clone()));
            let result = executor
                .execute_stored(services.graphs.as_ref(), &caller, &params.graph_id, parameters)
                .await;
            services.stats.record_execution(result.is_ok());

            serde_json::to_value(result?).map_err(|e| GatewayError::Internal(e.to_string()))
        }

        other => Err(GatewayError::MethodNotFound(other.to_string())),
    }
}
