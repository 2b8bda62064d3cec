//! Persistent store seam.
//!
//! The store owns graph definitions, credentials and tenant memberships. The
//! core reads it, and writes only credential revocation and `last_used_at`.
//!
//! # Design Decisions
//! - Two narrow traits so token validation and graph loading can be doubled
//!   independently in tests
//! - Graph lookups are always tenant scoped; a foreign graph id is simply absent

pub mod memory;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::workflow::{Graph, GraphSummary};

pub use memory::MemoryStore;
pub use types::{Credential, Membership, StoreSnapshot};

/// Errors surfaced by a store backing.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Credential and membership access used by token validation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by secret hash, whatever its state.
    async fn find_credential_by_hash(&self, secret_hash: &str) -> StoreResult<Option<Credential>>;

    /// Whether `user_id` is currently a member of `tenant_id`.
    async fn has_membership(&self, tenant_id: &str, user_id: &str) -> StoreResult<bool>;

    /// Mark a credential revoked.
    async fn revoke_credential(&self, credential_id: &str, revoked_at: u64) -> StoreResult<()>;

    /// Record a successful use.
    async fn touch_credential(&self, credential_id: &str, used_at: u64) -> StoreResult<()>;
}

/// Tenant-scoped graph access used by the executor.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn load_graph(&self, tenant_id: &str, graph_id: &str) -> StoreResult<Option<Graph>>;

    async fn list_graphs(&self, tenant_id: &str) -> StoreResult<Vec<GraphSummary>>;
}
