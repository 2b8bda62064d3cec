//! In-process request counters backing the admin metrics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters shared by every request handler.
#[derive(Debug, Default)]
pub struct GatewayStats {
    requests: AtomicU64,
    rpc_errors: AtomicU64,
    rate_limited: AtomicU64,
    auth_failures: AtomicU64,
    executions_succeeded: AtomicU64,
    executions_failed: AtomicU64,
    sessions_bound: AtomicU64,
}

/// Point-in-time copy of [`GatewayStats`] plus gauges filled by the caller.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub rpc_errors: u64,
    pub rate_limited: u64,
    pub auth_failures: u64,
    pub executions_succeeded: u64,
    pub executions_failed: u64,
    pub sessions_bound: u64,
    pub connected_credentials: usize,
    pub flagged_users: usize,
    pub rate_limit_fallback_buckets: usize,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.executions_succeeded
        } else {
            &self.executions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_bound(&self) {
        self.sessions_bound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            executions_succeeded: self.executions_succeeded.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
            sessions_bound: self.sessions_bound.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}
