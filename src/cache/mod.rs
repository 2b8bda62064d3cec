//! External cache seam.
//!
//! # Data Flow
//! ```text
//! session binder  ─┐
//!                  ├─▶ CacheStore (set/get/delete/refresh/scan/increment)
//! rate limiter    ─┘        │
//!                           ▼
//!                   memory.rs (in-process backing)
//! ```
//!
//! # Design Decisions
//! - Every operation is a single atomic primitive; callers never rely on
//!   check-then-act across two calls
//! - Scans are cursor based so callers can enforce a hard page ceiling
//! - An error means "unreachable"; callers pick their own fallback

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;

/// Errors surfaced by a cache backing.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A stored value did not have the expected shape.
    #[error("corrupt cache value under '{0}'")]
    Corrupt(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// One page of a cursor scan. A returned cursor of `0` means the scan is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Counter state after an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    /// Time left until the counter expires.
    pub ttl: Duration,
}

/// Operations the core needs from the external cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Fetch a live value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Reset the expiry of an existing key. Never creates the key.
    async fn refresh_expiry(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Return up to `count` keys starting with `prefix`, continuing from `cursor`.
    async fn scan(&self, cursor: u64, prefix: &str, count: usize) -> CacheResult<ScanPage>;

    /// Atomically increment a counter, setting `window` as its expiry on creation.
    async fn increment(&self, key: &str, window: Duration) -> CacheResult<Counter>;

    /// Drop entries whose expiry has passed. Backings with native expiry return 0.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }
}
