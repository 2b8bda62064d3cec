//! Workflow execution errors.

use thiserror::Error;

use crate::capabilities::CapabilityError;
use crate::store::StoreError;

/// Errors that stop a graph execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No graph with this id is visible to the caller's tenant.
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// Structural problem found while building the dependency graph.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Topological ordering could not place every step.
    #[error("cycle detected: {unordered} of {total} steps are part of or behind a cycle")]
    CycleDetected { unordered: usize, total: usize },

    /// A step names a capability missing from the catalog.
    #[error("unregistered capability '{capability}' on step '{step_id}'")]
    UnregisteredCapability { step_id: String, capability: String },

    /// A capability returned an error; nothing after it ran.
    #[error("step '{step_id}' failed: {source}")]
    StepFailed {
        step_id: String,
        #[source]
        source: CapabilityError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
