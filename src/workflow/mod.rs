//! Workflow graphs and their execution.
//!
//! # Data Flow
//! ```text
//! GraphStore::load_graph (tenant scoped)
//!     → graph.rs (adjacency + in-degree, Kahn ordering, cycle rejection)
//!     → executor.rs (resolve capabilities, then run steps in order)
//!         per step: merge global ⊕ static ⊕ prior outputs → sanitize → invoke → sanitize
//!     → ExecutionResult { output, metadata }
//! ```
//!
//! # Design Decisions
//! - Acyclicity is checked on every run, never trusted from storage
//! - Steps run strictly sequentially; ties break by stored step order
//! - Any failure aborts the run; there is no partial-success result

pub mod error;
pub mod executor;
pub mod graph;
pub mod types;

pub use error::ExecutionError;
pub use executor::{Caller, GraphExecutor, PRIOR_OUTPUTS_KEY};
pub use graph::DependencyGraph;
pub use types::{
    ExecutionContext, ExecutionMetadata, ExecutionResult, Graph, GraphSummary, Link, Step, StepKind,
};
