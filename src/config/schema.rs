//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Origin/host policy for browser-originated requests.
    pub origin: OriginConfig,

    /// Request budgets.
    pub rate_limit: RateLimitConfig,

    /// Session binding settings.
    pub session: SessionConfig,

    /// External cache settings.
    pub cache: CacheConfig,

    /// Persistent store settings.
    pub store: StoreConfig,

    /// Parameter sanitization settings.
    pub sanitizer: SanitizerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// DNS-rebinding defense settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OriginConfig {
    /// Origins accepted verbatim. Empty rejects every request.
    pub allowed_origins: Vec<String>,

    /// Expected `Host` header. When unset the request's own authority is used.
    pub expected_host: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per IP window (pre-authentication).
    pub ip_max_requests: u64,

    /// IP window length in seconds.
    pub ip_window_secs: u64,

    /// Requests allowed per user window (post-authentication).
    pub user_max_requests: u64,

    /// User window length in seconds.
    pub user_window_secs: u64,

    /// How often expired in-process buckets are swept.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_max_requests: 20,
            ip_window_secs: 60,
            user_max_requests: 100,
            user_window_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Session binding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Rolling TTL applied on create and on every extend.
    pub ttl_secs: u64,

    /// Absolute lifetime after which maintenance cleanup removes a session.
    pub max_lifetime_secs: u64,

    /// Keys requested per scan call.
    pub scan_chunk_size: usize,

    /// Hard ceiling on scan calls per operation.
    pub max_scan_pages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_lifetime_secs: 24 * 3600,
            scan_chunk_size: 100,
            max_scan_pages: 20,
        }
    }
}

/// External cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When disabled, sessions run in development (no-persistence) mode and
    /// rate limiting uses the in-process fallback only.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file with credentials, memberships and graphs.
    pub data_path: Option<String>,
}

/// Parameter sanitization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Strip events per user before a security alert is raised.
    pub alert_threshold: u32,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self { alert_threshold: 5 }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for outbound HTTP made by capabilities.
    pub capability_http_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            capability_http_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "json" for production, "pretty" for development.
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Maintenance endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable maintenance endpoints.
    pub enabled: bool,

    /// Shared secret (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
