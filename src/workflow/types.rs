//! Stored workflow definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved and regular step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Passes the global parameters in. Carries no capability.
    Entry,
    /// Passes the last output out. Carries no capability.
    Exit,
    /// Invokes a registered capability.
    Action,
}

impl StepKind {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, StepKind::Entry | StepKind::Exit)
    }
}

/// One unit of work in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub static_parameters: Map<String, Value>,
}

/// A dependency edge: `target_step_id` runs after `source_step_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source_step_id: String,
    pub target_step_id: String,
    #[serde(default)]
    pub source_port: Option<String>,
    #[serde(default)]
    pub target_port: Option<String>,
}

/// A stored workflow: steps plus directed dependency links, owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Graph {
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            step_count: self.steps.len(),
        }
    }
}

/// Listing view of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub step_count: usize,
}

/// Per-invocation state handed to every capability. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub graph_id: String,
    /// Step currently running.
    pub step_id: String,
    pub tenant_id: String,
    pub user_id: String,
    /// Sanitized outputs of steps that already ran, keyed by step id.
    pub prior_outputs: Map<String, Value>,
}

/// Execution metadata returned alongside the final output.
///
/// `steps_executed` counts every step run, `entry` and `exit` included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub graph_id: String,
    pub steps_executed: usize,
    pub execution_order: Vec<String>,
    pub duration_ms: u64,
}

/// Successful execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: Value,
    pub metadata: ExecutionMetadata,
}
