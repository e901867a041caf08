//! Contracts for the external collaborators the engine depends on.
//!
//! Decomposition, routing proposals and worker invocation are usually backed
//! by text-generation calls. The engine only relies on the shapes below, so
//! every collaborator can be replaced by a deterministic test double.

use crate::enricher::EnrichedInput;
use crate::registry::CapabilityRegistry;
use crate::types::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskswarm_core::{SwarmResult, TaskId};

/// A task record as produced by the decomposition service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTask {
    /// Missing ids are generated when the plan is built.
    #[serde(default)]
    pub id: Option<TaskId>,
    pub description: String,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub priority: i32,
}

impl RawTask {
    pub fn new(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_operations<I, S>(mut self, operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operations = operations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn into_task(self) -> Task {
        let task = match self.id {
            Some(id) => Task::with_id(id, self.description),
            None => Task::new(self.description),
        };
        task.with_operations(self.operations)
            .with_dependencies(self.dependencies)
            .with_priority(self.priority)
    }
}

/// Output of the decomposition service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decomposition {
    #[serde(default)]
    pub tasks: Vec<RawTask>,
    /// Answer for queries that need no tasks at all.
    #[serde(default)]
    pub direct_answer: Option<String>,
}

impl Decomposition {
    pub fn tasks(tasks: Vec<RawTask>) -> Self {
        Self {
            tasks,
            direct_answer: None,
        }
    }

    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            tasks: Vec::new(),
            direct_answer: Some(answer.into()),
        }
    }
}

/// Breaks a query into tasks.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(
        &self,
        query: &str,
        registry: &CapabilityRegistry,
    ) -> SwarmResult<Decomposition>;
}

/// One proposed task → worker assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingProposal {
    pub task_id: TaskId,
    pub worker_name: String,
    /// `None` means the proposer could not score the match.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RoutingProposal {
    pub fn new(
        task_id: impl Into<TaskId>,
        worker_name: impl Into<String>,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            worker_name: worker_name.into(),
            confidence,
        }
    }
}

/// Proposes worker assignments for a set of tasks.
#[async_trait]
pub trait RoutingProposer: Send + Sync {
    async fn propose(
        &self,
        tasks: &[Task],
        registry: &CapabilityRegistry,
    ) -> SwarmResult<Vec<RoutingProposal>>;
}

/// What a worker returns for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub success: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    /// "Nothing found". Dependents of an empty result are never scheduled.
    #[serde(default)]
    pub is_empty: bool,
}

impl WorkerOutcome {
    pub fn success(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            success: true,
            payload: payload.into(),
            error: None,
            is_empty: false,
        }
    }

    /// A successful outcome that found nothing. The payload may explain what
    /// was searched.
    pub fn empty(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            is_empty: true,
            ..Self::success(payload)
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
            is_empty: false,
        }
    }
}

/// Invokes a named worker with an enriched input.
#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke(&self, worker_name: &str, input: &EnrichedInput)
        -> SwarmResult<WorkerOutcome>;
}
