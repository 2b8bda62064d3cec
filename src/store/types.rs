//! Records read from the persistent store.

use serde::{Deserialize, Serialize};

use crate::workflow::Graph;

/// A long-lived, hashed bearer secret granting one user access to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub owner_user_id: String,
    pub tenant_id: String,
    /// Lowercase hex SHA-256 of the raw bearer string.
    pub secret_hash: String,
    pub created_at: u64,
    pub expires_at: u64,
    #[serde(default)]
    pub revoked_at: Option<u64>,
    #[serde(default)]
    pub last_used_at: Option<u64>,
    pub display_name: String,
}

impl Credential {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// A user's membership in a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub tenant_id: String,
    pub user_id: String,
}

/// On-disk snapshot format for [`super::MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub credentials: Vec<Credential>,
    pub memberships: Vec<Membership>,
    pub graphs: Vec<Graph>,
}
