//! JSON-RPC envelopes and their HTTP rendering.
//!
//! # Responsibilities
//! - Parse a request body into an [`RpcRequest`]
//! - Render success and error envelopes with the right HTTP status
//! - Attach rate-limit, session and CORS headers
//!
//! # Design Decisions
//! - Errors render only the generic public message and optional safe `data`
//! - A parse failure still answers with a JSON-RPC envelope (`id: null`)

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::security::RateLimitDecision;

pub const X_SESSION_ID: &str = "x-session-id";
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// A decoded JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Decode and check the envelope shape.
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| GatewayError::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(GatewayError::InvalidRequest("request must be an object".into()));
        }
        let request: RpcRequest = serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        if request.jsonrpc.as_deref() != Some("2.0") {
            return Err(GatewayError::InvalidRequest("jsonrpc must be \"2.0\"".into()));
        }
        match request.method.as_deref() {
            Some(m) if !m.is_empty() => Ok(request),
            _ => Err(GatewayError::InvalidRequest("missing method".into())),
        }
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }
}

/// An HTTP response carrying one JSON-RPC envelope.
#[derive(Debug)]
pub struct RpcReply {
    status: StatusCode,
    body: Value,
    headers: HeaderMap,
}

impl RpcReply {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            headers: HeaderMap::new(),
        }
    }

    pub fn error(id: Value, error: &GatewayError) -> Self {
        let mut body = json!({
            "code": error.code(),
            "message": error.public_message(),
        });
        if let Some(data) = error.data() {
            body["data"] = data;
        }
        Self {
            status: error.http_status(),
            body: json!({ "jsonrpc": "2.0", "id": id, "error": body }),
            headers: HeaderMap::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Attach `x-ratelimit-*` headers, plus `retry-after` when rejected.
    pub fn with_rate_limit(mut self, decision: &RateLimitDecision) -> Self {
        self.insert(X_RATELIMIT_LIMIT, &decision.limit.to_string());
        self.insert(X_RATELIMIT_REMAINING, &decision.remaining.to_string());
        self.insert(X_RATELIMIT_RESET, &decision.reset_time.to_string());
        if let Some(retry_after) = decision.retry_after {
            self.insert(header::RETRY_AFTER.as_str(), &retry_after.to_string());
        }
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.insert(X_SESSION_ID, session_id);
        self
    }

    /// Reflect one validated origin.
    pub fn with_cors(mut self, origin: Option<&str>) -> Self {
        if let Some(origin) = origin {
            self.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), origin);
            self.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS.as_str(), EXPOSED_HEADERS);
            self.insert(header::VARY.as_str(), "Origin");
        }
        self
    }

    fn insert(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
    }
}

const EXPOSED_HEADERS: &str =
    "x-session-id, x-request-id, x-ratelimit-limit, x-ratelimit-remaining, x-ratelimit-reset, retry-after";

impl IntoResponse for RpcReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}

/// CORS preflight answer for `/rpc`.
pub fn preflight(origin: &str) -> Response {
    let headers = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.to_string()),
        (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, DELETE, OPTIONS".to_string()),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "authorization, content-type, x-session-id".to_string(),
        ),
        (header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS.to_string()),
        (header::ACCESS_CONTROL_MAX_AGE, "600".to_string()),
        (header::VARY, "Origin".to_string()),
    ];
    (StatusCode::NO_CONTENT, headers).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenError;

    #[test]
    fn test_parse_rejects_bad_envelopes() {
        assert!(matches!(RpcRequest::parse(b"{not json"), Err(GatewayError::Parse(_))));
        assert!(matches!(RpcRequest::parse(b"[1,2]"), Err(GatewayError::InvalidRequest(_))));
        assert!(matches!(
            RpcRequest::parse(br#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            RpcRequest::parse(br#"{"jsonrpc":"2.0","id":1}"#),
            Err(GatewayError::InvalidRequest(_))
        ));

        let ok = RpcRequest::parse(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_eq!(ok.method(), "ping");
        assert_eq!(ok.id, json!(7));
        assert!(ok.params.is_null());
    }

    #[test]
    fn test_error_reply_uses_public_message_and_status() {
        let reply = RpcReply::error(json!(1), &GatewayError::from(TokenError::Expired));
        assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"]["code"], -32004);
        assert_eq!(reply.body["error"]["message"], "Credential expired");
        assert!(reply.body["error"].get("data").is_none());
    }

    #[test]
    fn test_rate_limit_headers() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 20,
            remaining: 0,
            reset_time: 1_700_000_000,
            retry_after: Some(42),
        };
        let response = RpcReply::error(json!(null), &GatewayError::RateLimited { scope: "ip" })
            .with_rate_limit(&decision)
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers[X_RATELIMIT_LIMIT], "20");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[header::RETRY_AFTER], "42");
    }
}
