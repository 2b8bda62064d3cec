//! In-process cache backing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheError, CacheResult, CacheStore, Counter, ScanPage};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A thread-safe expiring key/value map implementing [`CacheStore`].
///
/// Expired entries are invisible to reads and removed lazily or by
/// [`CacheStore::purge_expired`].
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.inner.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let value = self
            .inner
            .get(key)
            .and_then(|e| e.is_live(now).then(|| e.value.clone()));
        if value.is_none() {
            self.inner.remove_if(key, |_, e| !e.is_live(now));
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .inner
            .remove(key)
            .map(|(_, e)| e.is_live(now))
            .unwrap_or(false))
    }

    async fn refresh_expiry(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        match self.inner.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan(&self, cursor: u64, prefix: &str, count: usize) -> CacheResult<ScanPage> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .inner
            .iter()
            .filter(|r| r.key().starts_with(prefix) && r.value().is_live(now))
            .map(|r| r.key().clone())
            .collect();
        keys.sort();

        let start = cursor as usize;
        let page: Vec<String> = keys.iter().skip(start).take(count).cloned().collect();
        let next = start + page.len();
        let cursor = if next < keys.len() { next as u64 } else { 0 };

        Ok(ScanPage { cursor, keys: page })
    }

    async fn increment(&self, key: &str, window: Duration) -> CacheResult<Counter> {
        let now = Instant::now();
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let entry = occupied.get_mut();
                let count = entry
                    .value
                    .parse::<u64>()
                    .map_err(|_| CacheError::Corrupt(key.to_string()))?
                    + 1;
                entry.value = count.to_string();
                Ok(Counter {
                    count,
                    ttl: entry.expires_at.saturating_duration_since(now),
                })
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at: now + window,
                });
                Ok(Counter { count: 1, ttl: window })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at: now + window,
                });
                Ok(Counter { count: 1, ttl: window })
            }
        }
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, e| e.is_live(now));
        Ok(before.saturating_sub(self.inner.len()))
    }
}
