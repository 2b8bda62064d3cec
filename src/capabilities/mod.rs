//! Capability registry.
//!
//! # Data Flow
//! ```text
//! step.capability ("text.template")
//!     → CapabilityRegistry::resolve (per request, lazily cached)
//!     → CATALOG lookup (compile-time, read-only)
//!     → Arc<dyn Capability>
//! ```
//!
//! # Design Decisions
//! - The catalog is a static slice built at compile time; executable code is
//!   never located from a runtime string beyond an exact name match
//! - Each request owns its registry, so the handler cache needs no locking
//! - Handlers receive already-sanitized parameters and an execution context

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::workflow::ExecutionContext;

pub use builtin::CATALOG;

/// Errors a capability handler may return.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Failed(String),
}

/// The requested name is absent from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unregistered capability '{0}'")]
pub struct UnregisteredCapability(pub String);

/// An executable handler invocable by a step.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, params: Value, ctx: &ExecutionContext) -> Result<Value, CapabilityError>;
}

/// Settings handed to capability constructors.
#[derive(Debug, Clone)]
pub struct CapabilitySettings {
    pub http_timeout: Duration,
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Static registration entry.
pub struct CapabilityDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn(&CapabilitySettings) -> Arc<dyn Capability>,
}

/// Public listing view of a catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Per-request name → handler resolver with a lazy cache.
pub struct CapabilityRegistry {
    catalog: &'static [CapabilityDescriptor],
    settings: CapabilitySettings,
    cache: HashMap<&'static str, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Registry over the built-in catalog.
    pub fn new(settings: CapabilitySettings) -> Self {
        Self::with_catalog(CATALOG, settings)
    }

    pub fn with_catalog(catalog: &'static [CapabilityDescriptor], settings: CapabilitySettings) -> Self {
        Self {
            catalog,
            settings,
            cache: HashMap::new(),
        }
    }

    /// Resolve a handler, constructing it on first use.
    pub fn resolve(&mut self, name: &str) -> Result<Arc<dyn Capability>, UnregisteredCapability> {
        let catalog = self.catalog;
        let descriptor = catalog
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| UnregisteredCapability(name.to_string()))?;

        let settings = &self.settings;
        let handler = self
            .cache
            .entry(descriptor.name)
            .or_insert_with(|| (descriptor.build)(settings));
        Ok(handler.clone())
    }

    /// Number of handlers constructed so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn list(&self) -> Vec<CapabilityInfo> {
        self.catalog
            .iter()
            .map(|d| CapabilityInfo {
                name: d.name,
                description: d.description,
            })
            .collect()
    }
}
