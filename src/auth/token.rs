//! Bearer credential validation.
//!
//! # Flow
//! ```text
//! "Bearer fgk_..."
//!     → parse_bearer (missing / malformed)
//!     → hash_secret (SHA-256, raw secret never compared or logged)
//!     → CredentialStore::find_credential_by_hash (unknown / revoked / expired)
//!     → CredentialStore::has_membership (every call, never cached)
//!         gone → revoke credential, fail
//!     → touch last_used_at, mark connected
//!     → ConnectionContext
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::{CredentialStore, StoreError};

/// Prefix every issued credential carries.
pub const CREDENTIAL_PREFIX: &str = "fgk_";

const MIN_SECRET_BODY_LEN: usize = 32;

/// Distinct authentication failure modes.
///
/// The `Display` text is internal; callers map variants to generic public messages.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing bearer credential")]
    Missing,

    #[error("malformed bearer credential")]
    Malformed,

    #[error("unknown or revoked credential")]
    Invalid,

    #[error("expired credential")]
    Expired,

    #[error("credential '{connection_id}' owner lost tenant membership")]
    MembershipRevoked {
        connection_id: String,
        user_id: String,
    },

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl TokenError {
    /// Low-cardinality label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Missing => "missing",
            TokenError::Malformed => "malformed",
            TokenError::Invalid => "invalid",
            TokenError::Expired => "expired",
            TokenError::MembershipRevoked { .. } => "membership_revoked",
            TokenError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

/// Identity established by a validated credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionContext {
    /// The credential id.
    pub connection_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub display_name: String,
}

/// Resolves a bearer string to an identity.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, bearer: &str) -> Result<ConnectionContext, TokenError>;
}

/// Extract the credential from an `Authorization` header value.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, TokenError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(TokenError::Missing)?;
    let (scheme, token) = header.split_once(' ').ok_or(TokenError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::Malformed);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Missing);
    }
    Ok(token)
}

/// Whether `secret` has the issued credential shape.
pub fn is_well_formed(secret: &str) -> bool {
    secret
        .strip_prefix(CREDENTIAL_PREFIX)
        .map(|body| {
            body.len() >= MIN_SECRET_BODY_LEN
                && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .unwrap_or(false)
}

/// Lowercase hex SHA-256 of a raw secret.
pub fn hash_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// A fresh credential secret and its stored hash.
pub fn generate_credential() -> (String, String) {
    let secret = format!("{}{}", CREDENTIAL_PREFIX, super::random_hex(32));
    let hash = hash_secret(&secret);
    (secret, hash)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// [`TokenValidator`] backed by the persistent store.
pub struct StoreTokenValidator {
    store: Arc<dyn CredentialStore>,
    /// credential id -> last validated use (UNIX seconds). Observability only.
    connected: DashMap<String, u64>,
}

impl StoreTokenValidator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            connected: DashMap::new(),
        }
    }

    /// Credentials validated within `window`.
    pub fn connected_within(&self, window: Duration) -> usize {
        let cutoff = unix_now().saturating_sub(window.as_secs());
        self.connected.iter().filter(|r| *r.value() >= cutoff).count()
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.connected.contains_key(connection_id)
    }
}

#[async_trait]
impl TokenValidator for StoreTokenValidator {
    async fn validate(&self, bearer: &str) -> Result<ConnectionContext, TokenError> {
        if bearer.is_empty() {
            return Err(TokenError::Missing);
        }
        if !is_well_formed(bearer) {
            return Err(TokenError::Malformed);
        }

        let secret_hash = hash_secret(bearer);
        let credential = self
            .store
            .find_credential_by_hash(&secret_hash)
            .await?
            .ok_or(TokenError::Invalid)?;

        if credential.is_revoked() {
            return Err(TokenError::Invalid);
        }
        let now = unix_now();
        if credential.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        if !self
            .store
            .has_membership(&credential.tenant_id, &credential.owner_user_id)
            .await?
        {
            self.store.revoke_credential(&credential.id, now).await?;
            self.connected.remove(&credential.id);
            tracing::warn!(
                credential_id = %credential.id,
                user_id = %credential.owner_user_id,
                tenant_id = %credential.tenant_id,
                "Membership gone; credential revoked"
            );
            return Err(TokenError::MembershipRevoked {
                connection_id: credential.id,
                user_id: credential.owner_user_id,
            });
        }

        if let Err(e) = self.store.touch_credential(&credential.id, now).await {
            tracing::warn!(credential_id = %credential.id, error = %e, "Failed to record credential use");
        }
        self.connected.insert(credential.id.clone(), now);

        Ok(ConnectionContext {
            connection_id: credential.id,
            user_id: credential.owner_user_id,
            tenant_id: credential.tenant_id,
            display_name: credential.display_name,
        })
    }
}
