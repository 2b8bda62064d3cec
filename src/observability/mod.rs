//! Observability subsystem.
//!
//! Three sinks, fed from the request pipeline and the executor:
//!
//! - `logging`: `tracing` subscriber, text or JSON, filtered by `RUST_LOG`
//! - `metrics`: Prometheus counters and histograms when the exporter is on
//! - `stats`: atomic counters served by `GET /admin/metrics`, always on
//!
//! Security events (hijack attempts, sanitization alerts) log under the
//! `flowgate::security_alert` target so they can be routed separately.

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{GatewayStats, StatsSnapshot};
