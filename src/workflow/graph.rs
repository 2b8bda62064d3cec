//! Dependency graph construction and ordering.

use std::collections::{HashMap, VecDeque};

use super::error::ExecutionError;
use super::types::{Link, Step};

/// Index-based view of a graph used for ordering.
///
/// Step indices follow the stored step order, which is what makes tie-breaking
/// among simultaneously ready steps stable.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    step_ids: Vec<String>,
    /// Downstream step indices, in link order.
    adjacency: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    /// Build a graph from steps and links.
    pub fn build(steps: &[Step], links: &[Link]) -> Result<Self, ExecutionError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(ExecutionError::InvalidGraph(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let mut adjacency = vec![Vec::new(); steps.len()];
        let mut in_degree = vec![0usize; steps.len()];

        for link in links {
            let from = *index.get(link.source_step_id.as_str()).ok_or_else(|| {
                ExecutionError::InvalidGraph(format!(
                    "link '{}' references unknown source step '{}'",
                    link.id, link.source_step_id
                ))
            })?;
            let to = *index.get(link.target_step_id.as_str()).ok_or_else(|| {
                ExecutionError::InvalidGraph(format!(
                    "link '{}' references unknown target step '{}'",
                    link.id, link.target_step_id
                ))
            })?;
            adjacency[from].push(to);
            in_degree[to] += 1;
        }

        Ok(Self {
            step_ids: steps.iter().map(|s| s.id.clone()).collect(),
            adjacency,
            in_degree,
        })
    }

    pub fn len(&self) -> usize {
        self.step_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_ids.is_empty()
    }

    /// Downstream step ids of `step_id`.
    #[cfg(test)]
    fn downstream(&self, step_id: &str) -> Vec<&str> {
        self.step_ids
            .iter()
            .position(|id| id == step_id)
            .map(|i| {
                self.adjacency[i]
                    .iter()
                    .map(|&j| self.step_ids[j].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Execution order as step indices (Kahn's algorithm).
    ///
    /// Fails with [`ExecutionError::CycleDetected`] when any step cannot be
    /// placed, which happens exactly when the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, ExecutionError> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<usize> = (0..self.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &next in &self.adjacency[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < self.len() {
            return Err(ExecutionError::CycleDetected {
                unordered: self.len() - order.len(),
                total: self.len(),
            });
        }
        Ok(order)
    }

    /// Execution order as step ids.
    pub fn ordered_ids(&self) -> Result<Vec<&str>, ExecutionError> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.step_ids[i].as_str())
            .collect())
    }
}
