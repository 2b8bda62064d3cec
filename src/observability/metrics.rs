//! Metrics collection and exposition.
//!
//! # Metrics
//! - `flowgate_requests_total` (counter): RPC requests by method, outcome
//! - `flowgate_request_duration_seconds` (histogram): RPC latency
//! - `flowgate_rpc_errors_total` (counter): JSON-RPC error replies by code
//! - `flowgate_rate_limited_total` (counter): rejections by scope
//! - `flowgate_executions_total` (counter): graph runs by outcome
//! - `flowgate_execution_duration_seconds` (histogram): graph run latency
//! - `flowgate_sanitized_keys_total` (counter): stripped credential-shaped keys
//! - `flowgate_security_alerts_total` (counter): alerts by kind
//! - `flowgate_auth_failures_total` (counter): authentication failures by kind
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests need no setup
//! - Labels are low-cardinality: never user, tenant, or graph ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, outcome: &'static str, start: Instant) {
    metrics::counter!(
        "flowgate_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("flowgate_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_error(code: i64) {
    metrics::counter!("flowgate_rpc_errors_total", "code" => code.to_string()).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("flowgate_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_execution(outcome: &'static str, start: Instant) {
    metrics::counter!("flowgate_executions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("flowgate_execution_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_sanitized_keys(count: usize) {
    metrics::counter!("flowgate_sanitized_keys_total").increment(count as u64);
}

pub fn record_security_alert(kind: &'static str) {
    metrics::counter!("flowgate_security_alerts_total", "kind" => kind).increment(1);
}

pub fn record_auth_failure(kind: &'static str) {
    metrics::counter!("flowgate_auth_failures_total", "kind" => kind).increment(1);
}
