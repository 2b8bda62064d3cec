//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, chunk sizes > 0)
//! - Catch insecure combinations (admin enabled with placeholder key)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    for origin in &config.origin.allowed_origins {
        if url::Url::parse(origin).is_err() {
            errors.push(ValidationError::new(
                "origin.allowed_origins",
                format!("'{}' is not an absolute origin", origin),
            ));
        }
    }

    if let Some(host) = &config.origin.expected_host {
        if host.trim().is_empty() {
            errors.push(ValidationError::new("origin.expected_host", "must not be blank"));
        }
    }

    let rl = &config.rate_limit;
    if rl.ip_max_requests == 0 || rl.user_max_requests == 0 {
        errors.push(ValidationError::new("rate_limit", "request budgets must be > 0"));
    }
    if rl.ip_window_secs == 0 || rl.user_window_secs == 0 {
        errors.push(ValidationError::new("rate_limit", "window lengths must be > 0"));
    }
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be > 0"));
    }

    let session = &config.session;
    if session.ttl_secs == 0 {
        errors.push(ValidationError::new("session.ttl_secs", "must be > 0"));
    }
    if session.max_lifetime_secs < session.ttl_secs {
        errors.push(ValidationError::new(
            "session.max_lifetime_secs",
            "must be at least session.ttl_secs",
        ));
    }
    if session.scan_chunk_size == 0 || session.max_scan_pages == 0 {
        errors.push(ValidationError::new(
            "session",
            "scan_chunk_size and max_scan_pages must be > 0",
        ));
    }

    if config.sanitizer.alert_threshold == 0 {
        errors.push(ValidationError::new("sanitizer.alert_threshold", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if !matches!(config.observability.log_format.as_str(), "json" | "pretty") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"json\" or \"pretty\"",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_ADMIN_KEY)
    {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a real secret when admin is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
