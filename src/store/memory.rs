//! In-process store backed by a JSON snapshot.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use super::{Credential, CredentialStore, GraphStore, Membership, StoreResult, StoreSnapshot};
use crate::workflow::{Graph, GraphSummary};

/// A thread-safe store holding credentials, memberships and graphs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    credentials: Arc<DashMap<String, Credential>>,
    /// secret_hash -> credential id
    by_hash: Arc<DashMap<String, String>>,
    memberships: Arc<DashSet<Membership>>,
    graphs: Arc<DashMap<String, Graph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a snapshot file.
    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let file = File::open(path)?;
        let snapshot: StoreSnapshot = serde_json::from_reader(BufReader::new(file))?;
        let store = Self::from_snapshot(snapshot);
        tracing::info!(
            credentials = store.credentials.len(),
            memberships = store.memberships.len(),
            graphs = store.graphs.len(),
            "Loaded store snapshot"
        );
        Ok(store)
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for credential in snapshot.credentials {
            store.insert_credential(credential);
        }
        for membership in snapshot.memberships {
            store.memberships.insert(membership);
        }
        for graph in snapshot.graphs {
            store.insert_graph(graph);
        }
        store
    }

    pub fn insert_credential(&self, credential: Credential) {
        self.by_hash
            .insert(credential.secret_hash.clone(), credential.id.clone());
        self.credentials.insert(credential.id.clone(), credential);
    }

    pub fn credential(&self, id: &str) -> Option<Credential> {
        self.credentials.get(id).map(|r| r.value().clone())
    }

    pub fn add_membership(&self, tenant_id: &str, user_id: &str) {
        self.memberships.insert(Membership {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    pub fn remove_membership(&self, tenant_id: &str, user_id: &str) {
        self.memberships.remove(&Membership {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    pub fn insert_graph(&self, graph: Graph) {
        self.graphs.insert(graph.id.clone(), graph);
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_credential_by_hash(&self, secret_hash: &str) -> StoreResult<Option<Credential>> {
        let id = match self.by_hash.get(secret_hash) {
            Some(id) => id.value().clone(),
            None => return Ok(None),
        };
        Ok(self.credential(&id))
    }

    async fn has_membership(&self, tenant_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(self.memberships.contains(&Membership {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
        }))
    }

    async fn revoke_credential(&self, credential_id: &str, revoked_at: u64) -> StoreResult<()> {
        if let Some(mut credential) = self.credentials.get_mut(credential_id) {
            credential.revoked_at.get_or_insert(revoked_at);
        }
        Ok(())
    }

    async fn touch_credential(&self, credential_id: &str, used_at: u64) -> StoreResult<()> {
        if let Some(mut credential) = self.credentials.get_mut(credential_id) {
            credential.last_used_at = Some(used_at);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn load_graph(&self, tenant_id: &str, graph_id: &str) -> StoreResult<Option<Graph>> {
        Ok(self
            .graphs
            .get(graph_id)
            .filter(|g| g.tenant_id == tenant_id)
            .map(|g| g.value().clone()))
    }

    async fn list_graphs(&self, tenant_id: &str) -> StoreResult<Vec<GraphSummary>> {
        let mut graphs: Vec<GraphSummary> = self
            .graphs
            .iter()
            .filter(|g| g.tenant_id == tenant_id)
            .map(|g| g.summary())
            .collect();
        graphs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(graphs)
    }
}
