use crate::plan::Plan;
use crate::types::{Task, TaskResult};
use serde::{Deserialize, Serialize};
use taskswarm_core::TaskId;

/// Result of one upstream task, as seen by a dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyContext {
    pub task_id: TaskId,
    pub description: String,
    pub payload: serde_json::Value,
}

/// Immutable input handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedInput {
    pub task_id: TaskId,
    /// The query the plan was built for.
    pub query: String,
    pub description: String,
    pub operations: Vec<String>,
    /// Upstream payloads in dependency-declaration order.
    pub dependency_results: Vec<DependencyContext>,
}

impl EnrichedInput {
    /// Render as a worker prompt.
    pub fn render(&self) -> String {
        let operations = self
            .operations
            .iter()
            .enumerate()
            .map(|(i, op)| format!("{}. {op}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let mut out = format!(
            "Original Query: {}\n\nTask Description: {}\n\nOperations to perform in sequence:\n{operations}\n",
            self.query, self.description
        );

        if !self.dependency_results.is_empty() {
            out.push_str("\nDependency Results:\n");
            for dep in &self.dependency_results {
                let result = match &dep.payload {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                out.push_str(&format!(
                    "Dependency Task '{}':\n- Description: {}\n- Result:\n{result}\n",
                    dep.task_id, dep.description
                ));
            }
        }
        out
    }
}

/// Builds worker inputs from a task and the results recorded in its plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextEnricher;

impl ContextEnricher {
    /// Pure: the same task and results always produce the same input.
    /// Only succeeded dependencies contribute.
    pub fn enrich(&self, task: &Task, plan: &Plan) -> EnrichedInput {
        let dependency_results = task
            .dependencies
            .iter()
            .filter_map(|dep_id| {
                let payload = match plan.results().get(dep_id)? {
                    TaskResult::Succeeded { payload, .. } => payload.clone(),
                    _ => return None,
                };
                let description = plan
                    .get(dep_id)
                    .map(|t| t.description.clone())
                    .unwrap_or_default();
                Some(DependencyContext {
                    task_id: dep_id.clone(),
                    description,
                    payload,
                })
            })
            .collect();

        EnrichedInput {
            task_id: task.id.clone(),
            query: plan.query().to_string(),
            description: task.description.clone(),
            operations: task.operations.clone(),
            dependency_results,
        }
    }
}
