//! Sequential graph execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use super::error::ExecutionError;
use super::graph::DependencyGraph;
use super::types::{ExecutionContext, ExecutionMetadata, ExecutionResult, Graph};
use crate::capabilities::{Capability, CapabilityRegistry};
use crate::observability::metrics;
use crate::security::sanitizer::{sanitize, sanitize_map};
use crate::store::GraphStore;

/// Reserved parameter key carrying the outputs of steps that already ran.
pub const PRIOR_OUTPUTS_KEY: &str = "prior_outputs";

/// Who is running the graph.
#[derive(Debug, Clone)]
pub struct Caller {
    pub tenant_id: String,
    pub user_id: String,
}

/// Runs one graph per request. Owns the request's capability registry.
pub struct GraphExecutor {
    registry: CapabilityRegistry,
}

impl GraphExecutor {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// Load a graph scoped to the caller's tenant and execute it.
    pub async fn execute_stored(
        &mut self,
        store: &dyn GraphStore,
        caller: &Caller,
        graph_id: &str,
        parameters: Map<String, Value>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let graph = store
            .load_graph(&caller.tenant_id, graph_id)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(graph_id.to_string()))?;
        self.execute(&graph, caller, parameters).await
    }

    /// Execute `graph` in topological order.
    ///
    /// Structure, ordering and capability resolution are all checked before the
    /// first handler runs, so a rejected graph never partially executes.
    pub async fn execute(
        &mut self,
        graph: &Graph,
        caller: &Caller,
        parameters: Map<String, Value>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let result = self.run(graph, caller, parameters, started).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(ExecutionError::CycleDetected { .. }) => "cycle",
            Err(ExecutionError::StepFailed { .. }) => "step_failed",
            Err(_) => "rejected",
        };
        metrics::record_execution(outcome, started);

        match &result {
            Ok(r) => tracing::info!(
                graph_id = %graph.id,
                tenant_id = %caller.tenant_id,
                steps = r.metadata.steps_executed,
                duration_ms = r.metadata.duration_ms,
                "Workflow executed"
            ),
            Err(e) => tracing::warn!(
                graph_id = %graph.id,
                tenant_id = %caller.tenant_id,
                error = %e,
                "Workflow execution failed"
            ),
        }
        result
    }

    async fn run(
        &mut self,
        graph: &Graph,
        caller: &Caller,
        parameters: Map<String, Value>,
        started: Instant,
    ) -> Result<ExecutionResult, ExecutionError> {
        let dependencies = DependencyGraph::build(&graph.steps, &graph.links)?;
        let order = dependencies.topological_order()?;
        let handlers = self.resolve_handlers(graph, &order)?;

        let (mut global, removed) = sanitize_map(&parameters);
        global.remove(PRIOR_OUTPUTS_KEY);
        if !removed.is_empty() {
            tracing::debug!(graph_id = %graph.id, removed = ?removed, "Stripped global parameters");
        }

        let mut ctx = ExecutionContext {
            graph_id: graph.id.clone(),
            step_id: String::new(),
            tenant_id: caller.tenant_id.clone(),
            user_id: caller.user_id.clone(),
            prior_outputs: Map::new(),
        };
        let mut current = Value::Object(global.clone());
        let mut execution_order = Vec::with_capacity(order.len());

        for index in order {
            let step = &graph.steps[index];
            ctx.step_id = step.id.clone();

            let output = match handlers.get(&index) {
                None => current.clone(),
                Some(handler) => {
                    let mut merged = global.clone();
                    merged.extend(step.static_parameters.clone());
                    merged.insert(
                        PRIOR_OUTPUTS_KEY.to_string(),
                        Value::Object(ctx.prior_outputs.clone()),
                    );
                    let (params, removed) = sanitize_map(&merged);
                    if !removed.is_empty() {
                        tracing::debug!(step_id = %step.id, removed = ?removed, "Stripped step parameters");
                    }

                    tracing::debug!(graph_id = %graph.id, step_id = %step.id, "Invoking step");
                    let raw = handler
                        .invoke(Value::Object(params), &ctx)
                        .await
                        .map_err(|source| ExecutionError::StepFailed {
                            step_id: step.id.clone(),
                            source,
                        })?;
                    let mut output = sanitize(&raw).value;
                    // recorded outputs feed later merges; keeping the key would nest every prior output again
                    if let Value::Object(map) = &mut output {
                        map.remove(PRIOR_OUTPUTS_KEY);
                    }
                    output
                }
            };

            ctx.prior_outputs.insert(step.id.clone(), output.clone());
            current = output;
            execution_order.push(step.id.clone());
        }

        Ok(ExecutionResult {
            output: current,
            metadata: ExecutionMetadata {
                graph_id: graph.id.clone(),
                steps_executed: execution_order.len(),
                execution_order,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    fn resolve_handlers(
        &mut self,
        graph: &Graph,
        order: &[usize],
    ) -> Result<HashMap<usize, Arc<dyn Capability>>, ExecutionError> {
        let mut handlers = HashMap::new();
        for &index in order {
            let step = &graph.steps[index];
            match (step.kind.is_passthrough(), step.capability.as_deref()) {
                (true, None) => {}
                (true, Some(_)) => {
                    return Err(ExecutionError::InvalidGraph(format!(
                        "step '{}' is {:?} and cannot carry a capability",
                        step.id, step.kind
                    )))
                }
                (false, None) => {
                    return Err(ExecutionError::InvalidGraph(format!(
                        "step '{}' has no capability",
                        step.id
                    )))
                }
                (false, Some(name)) => {
                    let handler = self.registry.resolve(name).map_err(|e| {
                        ExecutionError::UnregisteredCapability {
                            step_id: step.id.clone(),
                            capability: e.0,
                        }
                    })?;
                    handlers.insert(index, handler);
                }
            }
        }
        Ok(handlers)
    }
}
