use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use taskswarm_core::{SwarmError, SwarmResult, TaskId};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Decomposed but not yet routed.
    Pending,
    /// A worker has been assigned.
    Assigned,
    /// Every dependency has succeeded; waiting for a free slot.
    Ready,
    /// Handed to its worker.
    Running,
    /// The worker returned a successful outcome.
    Succeeded,
    /// Unassignable, timed out, or the worker reported an error.
    Failed,
    /// Never run because an upstream task failed or found nothing.
    Skipped,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Why a task ended `Failed`. Local to the task: recorded, never thrown.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFailure {
    /// No proposed worker met the capability and confidence bar.
    #[error("unassignable task: {reason}")]
    Unassignable {
        /// Why every proposal was rejected.
        reason: String,
    },
    /// The worker produced no outcome within the per-task timeout.
    #[error("task timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
    /// The worker reported a failure, or could not be invoked.
    #[error("worker '{worker}' failed: {message}")]
    Worker {
        /// Worker that ran the task.
        worker: String,
        /// Error reported by the worker.
        message: String,
    },
}

/// Why a task ended `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// An upstream task failed.
    UpstreamFailed {
        /// The failed task.
        task_id: TaskId,
    },
    /// An upstream task succeeded but found nothing.
    UpstreamEmpty {
        /// The task that returned an empty result.
        task_id: TaskId,
    },
    /// Some task returned an empty result while the global policy is active.
    GlobalShortCircuit {
        /// The task that returned an empty result.
        task_id: TaskId,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UpstreamFailed { task_id } => {
                write!(f, "upstream task {task_id} failed")
            }
            SkipReason::UpstreamEmpty { task_id } => {
                write!(f, "upstream task {task_id} found nothing")
            }
            SkipReason::GlobalShortCircuit { task_id } => {
                write!(f, "plan stopped after task {task_id} found nothing")
            }
        }
    }
}

/// Terminal result of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskResult {
    /// The worker's payload.
    Succeeded {
        /// Opaque worker output.
        payload: serde_json::Value,
        /// The worker signalled "nothing found".
        #[serde(default)]
        is_empty: bool,
    },
    /// The failure descriptor.
    Failed {
        /// What went wrong.
        failure: TaskFailure,
    },
    /// The task never ran.
    Skipped {
        /// Which upstream event pruned it.
        reason: SkipReason,
    },
}

/// Coarse phase of one plan's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    /// Decomposing the query and validating the plan.
    Planning,
    /// Assigning workers to tasks.
    Routing,
    /// Running the dependency graph.
    Executing,
    /// Building the report.
    Synthesizing,
    /// The report is ready.
    Done,
    /// A fatal error stopped the plan.
    Aborted,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnginePhase::Planning => write!(f, "planning"),
            EnginePhase::Routing => write!(f, "routing"),
            EnginePhase::Executing => write!(f, "executing"),
            EnginePhase::Synthesizing => write!(f, "synthesizing"),
            EnginePhase::Done => write!(f, "done"),
            EnginePhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// A unit of work assigned to exactly one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Operations the assigned worker performs, in order.
    pub operations: Vec<String>,
    /// Tasks that must succeed first, in declaration order.
    pub dependencies: Vec<TaskId>,
    /// Higher values are scheduled first among ready tasks.
    pub priority: i32,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub result: Option<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_id(TaskId::generate(), description)
    }

    pub fn with_id(id: impl Into<TaskId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            operations: Vec::new(),
            dependencies: Vec::new(),
            priority: 0,
            status: TaskStatus::Pending,
            assigned_worker: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
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

    /// Ready to run: assigned, and every dependency has succeeded.
    pub fn is_ready(&self, succeeded: &HashSet<TaskId>) -> bool {
        matches!(self.status, TaskStatus::Assigned | TaskStatus::Ready)
            && self.dependencies.iter().all(|dep| succeeded.contains(dep))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bind a worker. Only a `Pending` task can be assigned, so a worker is
    /// never replaced once set.
    pub fn assign(&mut self, worker: impl Into<String>) -> SwarmResult<()> {
        if self.status != TaskStatus::Pending || self.assigned_worker.is_some() {
            return Err(SwarmError::State(format!(
                "task {} cannot be assigned in state {}",
                self.id, self.status
            )));
        }
        self.assigned_worker = Some(worker.into());
        self.status = TaskStatus::Assigned;
        Ok(())
    }

    /// Succeeded with an empty result.
    pub fn found_nothing(&self) -> bool {
        matches!(
            self.result,
            Some(TaskResult::Succeeded { is_empty: true, .. })
        )
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match &self.result {
            Some(TaskResult::Failed { failure }) => Some(failure),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.result {
            Some(TaskResult::Succeeded { payload, .. }) => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Find config files").with_operations(["list_files"]);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.id.as_str().len(), 16);
        assert!(task.dependencies.is_empty());
        assert!(task.assigned_worker.is_none());
        assert!(task.result.is_none());
    }

    #[test]
    fn test_task_not_ready_until_assigned() {
        let task = Task::with_id("a", "Simple task");
        assert!(!task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_task_is_ready_with_deps() {
        let mut task = Task::with_id("b", "Dependent task").with_dependencies(["a"]);
        task.assign("files").unwrap();
        assert!(!task.is_ready(&HashSet::new()));

        let succeeded: HashSet<TaskId> = [TaskId::from("a")].into_iter().collect();
        assert!(task.is_ready(&succeeded));
    }

    #[test]
    fn test_task_not_ready_when_running() {
        let mut task = Task::with_id("r", "Running task");
        task.assign("files").unwrap();
        task.status = TaskStatus::Running;
        assert!(!task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_assign_only_once() {
        let mut task = Task::with_id("t", "Assign me");
        task.assign("files").unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);

        let err = task.assign("docker").unwrap_err();
        assert!(matches!(err, SwarmError::State(_)));
        assert_eq!(task.assigned_worker.as_deref(), Some("files"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
    }

    #[test]
    fn test_found_nothing() {
        let mut task = Task::with_id("f", "Find files");
        task.result = Some(TaskResult::Succeeded {
            payload: serde_json::json!([]),
            is_empty: true,
        });
        assert!(task.found_nothing());
        assert_eq!(task.payload(), Some(&serde_json::json!([])));
    }

    #[test]
    fn test_failure_display() {
        let failure = TaskFailure::Timeout { timeout_ms: 30_000 };
        assert_eq!(failure.to_string(), "task timed out after 30000ms");

        let failure = TaskFailure::Worker {
            worker: "docker".into(),
            message: "daemon unreachable".into(),
        };
        assert_eq!(
            failure.to_string(),
            "worker 'docker' failed: daemon unreachable"
        );
    }

    #[test]
    fn test_task_result_serialization() {
        let result = TaskResult::Failed {
            failure: TaskFailure::Unassignable {
                reason: "no worker".into(),
            },
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"outcome\":\"failed\""));
        assert!(json.contains("\"kind\":\"unassignable\""));
        let parsed: TaskResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Skipped.to_string(), "skipped");
        assert_eq!(EnginePhase::Synthesizing.to_string(), "synthesizing");
    }
}
