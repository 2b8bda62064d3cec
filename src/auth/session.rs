//! Session binding: every session id belongs to exactly one user.
//!
//! # Keys
//! ```text
//! session:{user_id}:{session_id}   → JSON Session      (ttl)
//! session-owner:{session_id}       → user_id           (ttl)
//! ```
//!
//! The owner index only exists to tell "unknown session" apart from "someone
//! else's session" without scanning.
//!
//! Without a cache the binder runs in development mode: nothing is persisted
//! and every session id is accepted for the presenting user.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ConnectionContext;
use crate::cache::{CacheError, CacheStore};
use crate::config::SessionConfig;

const SESSION_PREFIX: &str = "session:";
const OWNER_PREFIX: &str = "session-owner:";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session belongs to another user")]
    HijackAttempt,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A user-bound session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub tenant_id: String,
    /// Credential that created the session, if any.
    pub connection_id: Option<String>,
    /// UNIX seconds.
    pub created_at: u64,
}

fn session_key(user_id: &str, session_id: &str) -> String {
    format!("{SESSION_PREFIX}{user_id}:{session_id}")
}

fn owner_key(session_id: &str) -> String {
    format!("{OWNER_PREFIX}{session_id}")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct SessionBinder {
    cache: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    max_lifetime: Duration,
    scan_chunk_size: usize,
    max_scan_pages: usize,
}

impl SessionBinder {
    pub fn new(cache: Option<Arc<dyn CacheStore>>, config: &SessionConfig) -> Self {
        if cache.is_none() {
            tracing::warn!("No session cache configured; sessions are not persisted (development mode)");
        }
        Self {
            cache,
            ttl: Duration::from_secs(config.ttl_secs),
            max_lifetime: Duration::from_secs(config.max_lifetime_secs),
            scan_chunk_size: config.scan_chunk_size.max(1),
            max_scan_pages: config.max_scan_pages.max(1),
        }
    }

    /// Whether sessions are persisted.
    pub fn is_persistent(&self) -> bool {
        self.cache.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the caller's live session for this credential, or create one.
    ///
    /// An unreachable cache yields a fresh unpersisted session.
    pub async fn bind(&self, ctx: &ConnectionContext) -> Result<Session, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(new_session(ctx));
        };
        match self.bind_persisted(cache.as_ref(), ctx).await {
            Err(SessionError::Cache(CacheError::Unavailable(reason))) => {
                tracing::warn!(
                    user_id = %ctx.user_id,
                    error = %reason,
                    "Session cache unreachable; issuing unpersisted session"
                );
                Ok(new_session(ctx))
            }
            other => other,
        }
    }

    async fn bind_persisted(
        &self,
        cache: &dyn CacheStore,
        ctx: &ConnectionContext,
    ) -> Result<Session, SessionError> {
        let keys = self
            .scan_keys(cache, &format!("{SESSION_PREFIX}{}:", ctx.user_id))
            .await?;
        let mut existing: Option<Session> = None;
        for key in keys {
            let Some(session) = self.read(cache, &key).await? else {
                continue;
            };
            if session.connection_id.as_deref() != Some(ctx.connection_id.as_str())
                || session.tenant_id != ctx.tenant_id
            {
                continue;
            }
            if existing.as_ref().map_or(true, |e| session.created_at > e.created_at) {
                existing = Some(session);
            }
        }

        if let Some(session) = existing {
            // the record may have expired between scan and refresh
            if self.extend(&session).await? {
                return Ok(session);
            }
        }

        let session = new_session(ctx);
        self.store(cache, &session).await?;
        tracing::info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            tenant_id = %session.tenant_id,
            "Session created"
        );
        Ok(session)
    }

    /// Check that `session_id` exists and belongs to the presenting user.
    ///
    /// An unreachable cache accepts the id for the presenting user unverified;
    /// the bearer credential has already been checked by then.
    pub async fn validate(
        &self,
        session_id: &str,
        ctx: &ConnectionContext,
    ) -> Result<Session, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(implicit_session(session_id, ctx));
        };
        match self.validate_persisted(cache.as_ref(), session_id, ctx).await {
            Err(SessionError::Cache(CacheError::Unavailable(reason))) => {
                tracing::warn!(
                    session_id = %session_id,
                    user_id = %ctx.user_id,
                    error = %reason,
                    "Session cache unreachable; accepting presented session unverified"
                );
                Ok(implicit_session(session_id, ctx))
            }
            other => other,
        }
    }

    async fn validate_persisted(
        &self,
        cache: &dyn CacheStore,
        session_id: &str,
        ctx: &ConnectionContext,
    ) -> Result<Session, SessionError> {
        if let Some(session) = self
            .read(cache, &session_key(&ctx.user_id, session_id))
            .await?
        {
            if session.user_id == ctx.user_id {
                return Ok(session);
            }
        }

        match cache.get(&owner_key(session_id)).await? {
            Some(owner) if owner != ctx.user_id => {
                tracing::warn!(
                    target: "flowgate::security_alert",
                    session_id = %session_id,
                    presenting_user = %ctx.user_id,
                    "Session hijack attempt"
                );
                Err(SessionError::HijackAttempt)
            }
            _ => {
                tracing::warn!(session_id = %session_id, user_id = %ctx.user_id, "Unknown or expired session");
                Err(SessionError::NotFound)
            }
        }
    }

    /// Refresh the expiry of an existing session. Never recreates it.
    pub async fn extend(&self, session: &Session) -> Result<bool, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(true);
        };
        let refreshed = async {
            let refreshed = cache
                .refresh_expiry(&session_key(&session.user_id, &session.session_id), self.ttl)
                .await?;
            if refreshed {
                cache
                    .refresh_expiry(&owner_key(&session.session_id), self.ttl)
                    .await?;
            }
            Ok::<_, CacheError>(refreshed)
        }
        .await;

        match refreshed {
            Err(CacheError::Unavailable(reason)) => {
                tracing::warn!(session_id = %session.session_id, error = %reason, "Session cache unreachable; expiry not refreshed");
                Ok(true)
            }
            other => Ok(other?),
        }
    }

    /// Remove one session (logout). Returns whether it existed.
    pub async fn invalidate(&self, session_id: &str, user_id: &str) -> Result<bool, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        let removed = async {
            let removed = cache.delete(&session_key(user_id, session_id)).await?;
            if cache.get(&owner_key(session_id)).await?.as_deref() == Some(user_id) {
                cache.delete(&owner_key(session_id)).await?;
            }
            Ok::<_, CacheError>(removed)
        }
        .await;

        let removed = match removed {
            Err(CacheError::Unavailable(reason)) => {
                tracing::warn!(session_id = %session_id, error = %reason, "Session cache unreachable; logout not recorded");
                false
            }
            other => other?,
        };
        if removed {
            tracing::debug!(session_id = %session_id, user_id = %user_id, "Session invalidated");
        }
        Ok(removed)
    }

    /// Remove every session a credential created. Returns the count removed.
    pub async fn invalidate_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<usize, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let keys = self
            .scan_keys(cache.as_ref(), &format!("{SESSION_PREFIX}{user_id}:"))
            .await?;
        let mut removed = 0;
        for key in keys {
            let Some(session) = self.read(cache.as_ref(), &key).await? else {
                continue;
            };
            if session.connection_id.as_deref() == Some(connection_id) {
                cache.delete(&key).await?;
                cache.delete(&owner_key(&session.session_id)).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(user_id = %user_id, connection_id = %connection_id, removed, "Sessions invalidated for credential");
        }
        Ok(removed)
    }

    /// Live sessions belonging to a tenant.
    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Session>, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(Vec::new());
        };
        let keys = self.scan_keys(cache.as_ref(), SESSION_PREFIX).await?;
        let mut sessions = Vec::new();
        for key in keys {
            if let Some(session) = self.read(cache.as_ref(), &key).await? {
                if session.tenant_id == tenant_id {
                    sessions.push(session);
                }
            }
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    /// Drop expired entries, sessions past their maximum lifetime, unreadable
    /// records, and owner entries whose session is gone.
    pub async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let mut removed = cache.purge_expired().await?;
        let cutoff = unix_now().saturating_sub(self.max_lifetime.as_secs());

        for key in self.scan_keys(cache.as_ref(), SESSION_PREFIX).await? {
            let Some(raw) = cache.get(&key).await? else {
                continue;
            };
            let stale = match serde_json::from_str::<Session>(&raw) {
                Ok(session) => session.created_at <= cutoff,
                Err(_) => true,
            };
            if stale && cache.delete(&key).await? {
                removed += 1;
            }
        }

        for key in self.scan_keys(cache.as_ref(), OWNER_PREFIX).await? {
            let Some(owner) = cache.get(&key).await? else {
                continue;
            };
            let session_id = &key[OWNER_PREFIX.len()..];
            if cache.get(&session_key(&owner, session_id)).await?.is_none()
                && cache.delete(&key).await?
            {
                removed += 1;
            }
        }

        tracing::info!(removed, "Session cleanup finished");
        Ok(removed)
    }

    async fn store(&self, cache: &dyn CacheStore, session: &Session) -> Result<(), SessionError> {
        let raw = serde_json::to_string(session)
            .map_err(|_| CacheError::Corrupt(session.session_id.clone()))?;
        cache
            .set_with_expiry(&session_key(&session.user_id, &session.session_id), raw, self.ttl)
            .await?;
        cache
            .set_with_expiry(&owner_key(&session.session_id), session.user_id.clone(), self.ttl)
            .await?;
        Ok(())
    }

    /// Read a session record; unreadable records are skipped.
    async fn read(&self, cache: &dyn CacheStore, key: &str) -> Result<Option<Session>, SessionError> {
        let Some(raw) = cache.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping unreadable session record");
                Ok(None)
            }
        }
    }

    /// Collect keys under `prefix`, stopping at the page ceiling.
    async fn scan_keys(&self, cache: &dyn CacheStore, prefix: &str) -> Result<Vec<String>, SessionError> {
        let mut keys = Vec::new();
        let mut cursor = 0;
        let mut pages = 0;
        loop {
            let page = cache.scan(cursor, prefix, self.scan_chunk_size).await?;
            keys.extend(page.keys);
            pages += 1;
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
            if pages >= self.max_scan_pages {
                tracing::warn!(prefix = %prefix, pages, "Session scan stopped at page ceiling");
                break;
            }
        }
        Ok(keys)
    }
}

/// Stand-in for a session that cannot be checked against the cache.
fn implicit_session(session_id: &str, ctx: &ConnectionContext) -> Session {
    Session {
        session_id: session_id.to_string(),
        user_id: ctx.user_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        connection_id: Some(ctx.connection_id.clone()),
        created_at: unix_now(),
    }
}

fn new_session(ctx: &ConnectionContext) -> Session {
    Session {
        session_id: super::random_hex(32),
        user_id: ctx.user_id.clone(),
        tenant_id: ctx.tenant_id.clone(),
        connection_id: Some(ctx.connection_id.clone()),
        created_at: unix_now(),
    }
}
