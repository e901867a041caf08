use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use taskswarm_core::TaskId;
use tokio::sync::RwLock;

/// Activity of a worker as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    /// Idle, and the last task it ran failed or timed out.
    Error,
}

/// How one invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Empty,
    Failed,
    TimedOut,
    /// The plan aborted while the task was still running.
    Abandoned,
}

/// Cumulative counters for one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub empty_results: u64,
    #[serde(default)]
    pub abandoned: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub name: String,
    pub status: WorkerStatus,
    /// Tasks currently running on this worker.
    pub current_tasks: Vec<TaskId>,
    pub metrics: WorkerMetrics,
}

impl WorkerState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: WorkerStatus::Idle,
            current_tasks: Vec::new(),
            metrics: WorkerMetrics::default(),
        }
    }
}

/// Tracks per-worker state and metrics across plans.
#[derive(Clone)]
pub struct WorkerMonitor {
    states: Arc<RwLock<BTreeMap<String, WorkerState>>>,
}

impl WorkerMonitor {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Make a worker visible before it runs anything.
    pub async fn register(&self, worker: &str) {
        let mut states = self.states.write().await;
        states
            .entry(worker.to_string())
            .or_insert_with(|| WorkerState::new(worker));
    }

    /// Mark a worker as running a task.
    pub async fn start_task(&self, worker: &str, task_id: &TaskId) {
        let mut states = self.states.write().await;
        let state = states
            .entry(worker.to_string())
            .or_insert_with(|| WorkerState::new(worker));
        state.current_tasks.push(task_id.clone());
        state.status = WorkerStatus::Working;
        state.metrics.invocations += 1;
    }

    /// Record how a task ended and how long it ran.
    pub async fn finish_task(
        &self,
        worker: &str,
        task_id: &TaskId,
        completion: Completion,
        duration_ms: u64,
    ) {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(worker) else {
            return;
        };
        state.current_tasks.retain(|id| id != task_id);
        state.metrics.duration_ms += duration_ms;
        match completion {
            Completion::Succeeded => state.metrics.successes += 1,
            Completion::Empty => {
                state.metrics.successes += 1;
                state.metrics.empty_results += 1;
            }
            Completion::Failed => state.metrics.failures += 1,
            Completion::TimedOut => state.metrics.timeouts += 1,
            Completion::Abandoned => state.metrics.abandoned += 1,
        }
        state.status = if !state.current_tasks.is_empty() {
            WorkerStatus::Working
        } else if matches!(
            completion,
            Completion::Failed | Completion::TimedOut | Completion::Abandoned
        ) {
            WorkerStatus::Error
        } else {
            WorkerStatus::Idle
        };
    }

    /// Every worker's state, ordered by name.
    pub async fn snapshot(&self) -> Vec<WorkerState> {
        let states = self.states.read().await;
        states.values().cloned().collect()
    }

    pub async fn get_state(&self, worker: &str) -> Option<WorkerState> {
        let states = self.states.read().await;
        states.get(worker).cloned()
    }

    pub async fn aggregate_metrics(&self) -> WorkerMetrics {
        let states = self.states.read().await;
        let mut total = WorkerMetrics::default();
        for state in states.values() {
            total.invocations += state.metrics.invocations;
            total.successes += state.metrics.successes;
            total.failures += state.metrics.failures;
            total.timeouts += state.metrics.timeouts;
            total.empty_results += state.metrics.empty_results;
            total.abandoned += state.metrics.abandoned;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let workers = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "workers": workers,
            "aggregate": aggregate,
        })
    }
}

impl Default for WorkerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_starts_idle() {
        let monitor = WorkerMonitor::new();
        monitor.register("files").await;
        let state = monitor.get_state("files").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert!(state.current_tasks.is_empty());
        assert!(monitor.get_state("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_start_and_finish_task() {
        let monitor = WorkerMonitor::new();
        let task = TaskId::from("a");

        monitor.start_task("files", &task).await;
        let state = monitor.get_state("files").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_tasks, vec![task.clone()]);

        monitor
            .finish_task("files", &task, Completion::Succeeded, 120)
            .await;
        let state = monitor.get_state("files").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert_eq!(state.metrics.invocations, 1);
        assert_eq!(state.metrics.successes, 1);
        assert_eq!(state.metrics.duration_ms, 120);
    }

    #[tokio::test]
    async fn test_concurrent_tasks_on_one_worker() {
        let monitor = WorkerMonitor::new();
        monitor.start_task("files", &"a".into()).await;
        monitor.start_task("files", &"b".into()).await;
        monitor
            .finish_task("files", &"a".into(), Completion::TimedOut, 10)
            .await;

        let state = monitor.get_state("files").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_tasks, vec![TaskId::from("b")]);
        assert_eq!(state.metrics.timeouts, 1);

        monitor
            .finish_task("files", &"b".into(), Completion::Failed, 10)
            .await;
        let state = monitor.get_state("files").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Error);
    }

    #[tokio::test]
    async fn test_abandoned_task_releases_worker() {
        let monitor = WorkerMonitor::new();
        monitor.start_task("files", &"a".into()).await;
        monitor
            .finish_task("files", &"a".into(), Completion::Abandoned, 3)
            .await;

        let state = monitor.get_state("files").await.unwrap();
        assert!(state.current_tasks.is_empty());
        assert_eq!(state.status, WorkerStatus::Error);
        assert_eq!(state.metrics.abandoned, 1);
        assert_eq!(monitor.aggregate_metrics().await.abandoned, 1);
    }

    #[tokio::test]
    async fn test_aggregate_and_json() {
        let monitor = WorkerMonitor::new();
        monitor.start_task("files", &"a".into()).await;
        monitor
            .finish_task("files", &"a".into(), Completion::Empty, 5)
            .await;
        monitor.start_task("search", &"b".into()).await;
        monitor
            .finish_task("search", &"b".into(), Completion::Failed, 7)
            .await;

        let total = monitor.aggregate_metrics().await;
        assert_eq!(total.invocations, 2);
        assert_eq!(total.successes, 1);
        assert_eq!(total.empty_results, 1);
        assert_eq!(total.failures, 1);
        assert_eq!(total.duration_ms, 12);

        let json = monitor.to_json().await;
        assert_eq!(json["workers"].as_array().unwrap().len(), 2);
        assert_eq!(json["workers"][0]["name"], "files");
        assert_eq!(json["aggregate"]["invocations"], 2);
    }
}
