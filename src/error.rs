//! Gateway-wide error type and its protocol mapping.
//!
//! Component errors convert into [`GatewayError`], which owns the JSON-RPC
//! code, the HTTP status and the generic message a caller is allowed to see.
//! The `Display` output is for logs only.

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::{SessionError, TokenError};
use crate::capabilities::CapabilityError;
use crate::security::OriginRejection;
use crate::workflow::ExecutionError;

pub mod codes {
    pub const ORIGIN_REJECTED: i64 = -32000;
    pub const MISSING_CREDENTIAL: i64 = -32001;
    pub const MALFORMED_CREDENTIAL: i64 = -32002;
    pub const INVALID_CREDENTIAL: i64 = -32003;
    pub const EXPIRED_CREDENTIAL: i64 = -32004;
    pub const MEMBERSHIP_REVOKED: i64 = -32005;
    pub const SESSION_NOT_FOUND: i64 = -32006;
    pub const SESSION_HIJACK: i64 = -32007;
    pub const CYCLE_DETECTED: i64 = -32010;
    pub const UNREGISTERED_CAPABILITY: i64 = -32011;
    pub const STEP_FAILED: i64 = -32012;
    pub const SANITIZATION_REJECTED: i64 = -32013;
    pub const WORKFLOW_NOT_FOUND: i64 = -32014;
    pub const INVALID_GRAPH: i64 = -32015;
    pub const RATE_LIMITED: i64 = -32029;
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("origin rejected: {0}")]
    Origin(#[from] OriginRejection),

    #[error("rate limited ({scope})")]
    RateLimited { scope: &'static str },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("credential-shaped arguments rejected: {0:?}")]
    SanitizationRejected(Vec<String>),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i64 {
        use codes::*;
        match self {
            GatewayError::Origin(_) => ORIGIN_REJECTED,
            GatewayError::RateLimited { .. } => RATE_LIMITED,
            GatewayError::Token(e) => match e {
                TokenError::Missing => MISSING_CREDENTIAL,
                TokenError::Malformed => MALFORMED_CREDENTIAL,
                TokenError::Invalid => INVALID_CREDENTIAL,
                TokenError::Expired => EXPIRED_CREDENTIAL,
                TokenError::MembershipRevoked { .. } => MEMBERSHIP_REVOKED,
                TokenError::StoreUnavailable(_) => INTERNAL,
            },
            GatewayError::Session(e) => match e {
                SessionError::NotFound => SESSION_NOT_FOUND,
                SessionError::HijackAttempt => SESSION_HIJACK,
                SessionError::Cache(_) => INTERNAL,
            },
            GatewayError::Execution(e) => match e {
                ExecutionError::NotFound(_) => WORKFLOW_NOT_FOUND,
                ExecutionError::InvalidGraph(_) => INVALID_GRAPH,
                ExecutionError::CycleDetected { .. } => CYCLE_DETECTED,
                ExecutionError::UnregisteredCapability { .. } => UNREGISTERED_CAPABILITY,
                ExecutionError::StepFailed { .. } => STEP_FAILED,
                ExecutionError::Store(_) => INTERNAL,
            },
            GatewayError::SanitizationRejected(_) => SANITIZATION_REJECTED,
            GatewayError::Parse(_) => PARSE_ERROR,
            GatewayError::InvalidRequest(_) => INVALID_REQUEST,
            GatewayError::MethodNotFound(_) => METHOD_NOT_FOUND,
            GatewayError::InvalidParams(_) => INVALID_PARAMS,
            GatewayError::Internal(_) => INTERNAL,
        }
    }

    /// HTTP status carried by the error response.
    pub fn http_status(&self) -> StatusCode {
        match self.code() {
            codes::ORIGIN_REJECTED | codes::SESSION_HIJACK => StatusCode::FORBIDDEN,
            codes::MISSING_CREDENTIAL
            | codes::MALFORMED_CREDENTIAL
            | codes::INVALID_CREDENTIAL
            | codes::EXPIRED_CREDENTIAL
            | codes::MEMBERSHIP_REVOKED => StatusCode::UNAUTHORIZED,
            codes::SESSION_NOT_FOUND => StatusCode::NOT_FOUND,
            codes::RATE_LIMITED => StatusCode::TOO_MANY_REQUESTS,
            codes::PARSE_ERROR | codes::INVALID_REQUEST => StatusCode::BAD_REQUEST,
            codes::INTERNAL => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }

    /// Generic caller-facing message.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Origin(_) => "Origin not allowed",
            GatewayError::RateLimited { .. } => "Rate limit exceeded",
            GatewayError::Token(e) => match e {
                TokenError::Missing => "Authentication required",
                TokenError::Malformed => "Malformed credential",
                TokenError::Invalid => "Invalid credential",
                TokenError::Expired => "Credential expired",
                TokenError::MembershipRevoked { .. } => "Access revoked",
                TokenError::StoreUnavailable(_) => "Internal error",
            },
            GatewayError::Session(e) => match e {
                SessionError::NotFound => "Session not found",
                SessionError::HijackAttempt => "Session not permitted",
                SessionError::Cache(_) => "Internal error",
            },
            GatewayError::Execution(e) => match e {
                ExecutionError::NotFound(_) => "Workflow not found",
                ExecutionError::InvalidGraph(_) => "Invalid workflow graph",
                ExecutionError::CycleDetected { .. } => "Workflow graph contains a cycle",
                ExecutionError::UnregisteredCapability { .. } => "Unregistered capability",
                ExecutionError::StepFailed { .. } => "Step execution failed",
                ExecutionError::Store(_) => "Internal error",
            },
            GatewayError::SanitizationRejected(_) => "Credential-shaped arguments are not accepted",
            GatewayError::Parse(_) => "Parse error",
            GatewayError::InvalidRequest(_) => "Invalid request",
            GatewayError::MethodNotFound(_) => "Method not found",
            GatewayError::InvalidParams(_) => "Invalid params",
            GatewayError::Internal(_) => "Internal error",
        }
    }

    /// Optional structured detail. Never carries secrets.
    pub fn data(&self) -> Option<Value> {
        match self {
            GatewayError::Execution(ExecutionError::StepFailed { step_id, source }) => {
                let message = match source {
                    CapabilityError::Upstream(_) => "upstream request failed".to_string(),
                    other => other.to_string(),
                };
                Some(json!({ "step_id": step_id, "message": message }))
            }
            GatewayError::Execution(ExecutionError::UnregisteredCapability { step_id, capability }) => {
                Some(json!({ "step_id": step_id, "capability": capability }))
            }
            GatewayError::SanitizationRejected(keys) => Some(json!({ "keys": keys })),
            GatewayError::MethodNotFound(method) => Some(json!({ "method": method })),
            GatewayError::InvalidParams(reason) => Some(json!({ "reason": reason })),
            _ => None,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Origin(_) => "origin",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Token(e) => e.kind(),
            GatewayError::Session(SessionError::NotFound) => "session_not_found",
            GatewayError::Session(SessionError::HijackAttempt) => "session_hijack",
            GatewayError::Session(SessionError::Cache(_)) => "session_cache",
            GatewayError::Execution(_) => "execution",
            GatewayError::SanitizationRejected(_) => "sanitization_rejected",
            GatewayError::Parse(_) => "parse",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::MethodNotFound(_) => "method_not_found",
            GatewayError::InvalidParams(_) => "invalid_params",
            GatewayError::Internal(_) => "internal",
        }
    }
}
