//! Fixed-budget request windows per caller IP and per authenticated user.
//!
//! # Design Decisions
//! - The external cache's atomic increment is the primary counter so budgets
//!   hold across gateway instances
//! - When the cache is absent or unreachable, an in-process map takes over
//!   with the same window semantics and the same returned contract
//! - Exceeding the budget is a decision, not an error

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::config::RateLimitConfig;

/// Budget for one window kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_requests: u64,
    pub window: Duration,
}

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// UNIX seconds at which the current window ends.
    pub reset_time: u64,
    /// Seconds to wait before retrying; set only when rejected.
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    fn from_count(policy: WindowPolicy, count: u64, ttl: Duration) -> Self {
        let ttl_secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        let allowed = count <= policy.max_requests;
        Self {
            allowed,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(count),
            reset_time: unix_now() + ttl_secs,
            retry_after: (!allowed).then(|| ttl_secs.max(1)),
        }
    }

    fn unlimited(policy: WindowPolicy) -> Self {
        Self {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_time: unix_now() + policy.window.as_secs(),
            retry_after: None,
        }
    }
}

/// In-process window state.
#[derive(Debug, Clone, Copy)]
struct RateBucket {
    window_start: Instant,
    window: Duration,
    count: u64,
}

impl RateBucket {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }
}

/// Two-scope request limiter with cache-backed counters and a local fallback.
pub struct RateLimiter {
    enabled: bool,
    ip_policy: WindowPolicy,
    user_policy: WindowPolicy,
    cache: Option<Arc<dyn CacheStore>>,
    fallback: DashMap<String, RateBucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            enabled: config.enabled,
            ip_policy: WindowPolicy {
                max_requests: config.ip_max_requests,
                window: Duration::from_secs(config.ip_window_secs),
            },
            user_policy: WindowPolicy {
                max_requests: config.user_max_requests,
                window: Duration::from_secs(config.user_window_secs),
            },
            cache,
            fallback: DashMap::new(),
        }
    }

    /// Pre-authentication budget.
    pub async fn check_ip(&self, ip: IpAddr) -> RateLimitDecision {
        self.check(&format!("ip:{ip}"), self.ip_policy).await
    }

    /// Post-authentication budget.
    pub async fn check_user(&self, user_id: &str) -> RateLimitDecision {
        self.check(&format!("user:{user_id}"), self.user_policy).await
    }

    /// Count one request against `identifier`.
    pub async fn check(&self, identifier: &str, policy: WindowPolicy) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::unlimited(policy);
        }

        if let Some(cache) = &self.cache {
            match cache
                .increment(&format!("ratelimit:{identifier}"), policy.window)
                .await
            {
                Ok(counter) => return RateLimitDecision::from_count(policy, counter.count, counter.ttl),
                Err(e) => {
                    tracing::warn!(error = %e, "Rate limit store unreachable, using in-process fallback");
                }
            }
        }

        self.check_local(identifier, policy)
    }

    fn check_local(&self, identifier: &str, policy: WindowPolicy) -> RateLimitDecision {
        let now = Instant::now();
        let mut bucket = self
            .fallback
            .entry(identifier.to_string())
            .or_insert(RateBucket {
                window_start: now,
                window: policy.window,
                count: 0,
            });

        if bucket.is_expired(now) {
            bucket.window_start = now;
            bucket.window = policy.window;
            bucket.count = 0;
        }
        bucket.count += 1;

        let ttl = bucket
            .window
            .saturating_sub(now.duration_since(bucket.window_start));
        RateLimitDecision::from_count(policy, bucket.count, ttl)
    }

    /// Drop fallback buckets whose window has passed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.fallback.len();
        self.fallback.retain(|_, bucket| !bucket.is_expired(now));
        before.saturating_sub(self.fallback.len())
    }

    /// Sweep the fallback map and purge expired entries from the cache.
    ///
    /// The cache purge covers every expired key, sessions included. A cache
    /// error is logged and leaves the fallback sweep's count intact.
    pub async fn sweep_all(&self) -> usize {
        let mut removed = self.sweep();
        if let Some(cache) = &self.cache {
            match cache.purge_expired().await {
                Ok(purged) => removed += purged,
                Err(e) => tracing::warn!(error = %e, "Cache purge failed during sweep"),
            }
        }
        removed
    }

    /// Number of live fallback buckets.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Periodically sweep expired buckets and cache entries until shutdown.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_all().await;
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired buckets and cache entries");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, CacheResult, Counter, MemoryCache, ScanPage};
    use async_trait::async_trait;

    struct UnreachableCache;

    #[async_trait]
    impl CacheStore for UnreachableCache {
        async fn set_with_expiry(&self, _: &str, _: String, _: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn get(&self, _: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn delete(&self, _: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn refresh_expiry(&self, _: &str, _: Duration) -> CacheResult<bool> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn scan(&self, _: u64, _: &str, _: usize) -> CacheResult<ScanPage> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn increment(&self, _: &str, _: Duration) -> CacheResult<Counter> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn purge_expired(&self) -> CacheResult<usize> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn config(n: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            ip_max_requests: n,
            ip_window_secs: 60,
            user_max_requests: n,
            user_window_secs: 60,
            sweep_interval_secs: 60,
        }
    }

    async fn assert_budget(limiter: &RateLimiter, n: u64) {
        let mut last_remaining = u64::MAX;
        for _ in 0..n {
            let d = limiter.check_user("u1").await;
            assert!(d.allowed);
            assert_eq!(d.limit, n);
            assert!(d.remaining < last_remaining);
            assert!(d.retry_after.is_none());
            last_remaining = d.remaining;
        }
        assert_eq!(last_remaining, 0);

        let rejected = limiter.check_user("u1").await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert!(rejected.retry_after.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_cache_backed_budget() {
        let limiter = RateLimiter::new(&config(5), Some(Arc::new(MemoryCache::new())));
        assert_budget(&limiter, 5).await;
        assert_eq!(limiter.fallback_len(), 0);
    }

    #[tokio::test]
    async fn test_in_process_budget_without_cache() {
        let limiter = RateLimiter::new(&config(5), None);
        assert_budget(&limiter, 5).await;
    }

    #[tokio::test]
    async fn test_unreachable_cache_falls_back_transparently() {
        let limiter = RateLimiter::new(&config(3), Some(Arc::new(UnreachableCache)));
        assert_budget(&limiter, 3).await;
        assert_eq!(limiter.fallback_len(), 1);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let limiter = RateLimiter::new(&config(1), None);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check_ip(ip).await.allowed);
        assert!(!limiter.check_ip(ip).await.allowed);
        assert!(limiter.check_user("u1").await.allowed);
        assert!(limiter.check_ip("10.0.0.2".parse().unwrap()).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rollover_and_sweep() {
        let limiter = RateLimiter::new(&config(1), None);
        assert!(limiter.check_user("u1").await.allowed);
        assert!(!limiter.check_user("u1").await.allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.sweep(), 1);
        assert!(limiter.check_user("u1").await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_cache_counters() {
        let cache = MemoryCache::new();
        let limiter = Arc::new(RateLimiter::new(&config(5), Some(Arc::new(cache.clone()))));
        for i in 0..1_000u32 {
            let ip = IpAddr::from(std::net::Ipv4Addr::from(0x0a00_0000 + i));
            assert!(limiter.check_ip(ip).await.allowed);
        }
        assert_eq!(cache.len(), 1_000);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = limiter
            .clone()
            .spawn_sweeper(Duration::from_secs(90), shutdown_rx);

        // windows close at 60s, first sweep runs at 90s
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(cache.len(), 0);

        shutdown_tx.send(()).unwrap();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_all_tolerates_unreachable_cache() {
        let limiter = RateLimiter::new(&config(5), Some(Arc::new(UnreachableCache)));
        assert_eq!(limiter.sweep_all().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_always_allows() {
        let mut cfg = config(1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg, None);
        for _ in 0..10 {
            assert!(limiter.check_user("u1").await.allowed);
        }
    }
}
