use crate::collaborators::{WorkerInvoker, WorkerOutcome};
use crate::config::{EngineConfig, ShortCircuitPolicy};
use crate::enricher::{ContextEnricher, EnrichedInput};
use crate::monitor::{Completion, WorkerMonitor};
use crate::plan::{Plan, ShortCircuit};
use crate::types::{EnginePhase, SkipReason, TaskFailure, TaskStatus};
use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskswarm_core::{SwarmError, SwarmResult, TaskId};
use tokio::time::error::Elapsed;
use tracing::{debug, error, info, warn};

/// Counts for one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Worker invocations started.
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub short_circuited: bool,
    pub duration_ms: u64,
}

/// One finished invocation, as returned by the in-flight set.
struct Completed {
    task_id: TaskId,
    worker: String,
    elapsed: Duration,
    outcome: Result<SwarmResult<WorkerOutcome>, Elapsed>,
}

async fn invoke_with_timeout(
    invoker: Arc<dyn WorkerInvoker>,
    worker: String,
    input: EnrichedInput,
    timeout: Duration,
) -> Completed {
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, invoker.invoke(&worker, &input)).await;
    Completed {
        task_id: input.task_id,
        worker,
        elapsed: start.elapsed(),
        outcome,
    }
}

/// Runs a routed plan's dependency graph to completion.
///
/// The engine is the only writer of task status and results once routing is
/// over. Workers receive an immutable input and return an outcome; outcomes
/// are applied one at a time as they complete.
pub struct ExecutionEngine {
    invoker: Arc<dyn WorkerInvoker>,
    config: EngineConfig,
    enricher: ContextEnricher,
    monitor: WorkerMonitor,
}

impl ExecutionEngine {
    pub fn new(invoker: Arc<dyn WorkerInvoker>, config: EngineConfig) -> Self {
        Self {
            invoker,
            config,
            enricher: ContextEnricher,
            monitor: WorkerMonitor::new(),
        }
    }

    /// Share a monitor with other components.
    pub fn with_monitor(mut self, monitor: WorkerMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> &WorkerMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute every runnable task in `plan`.
    ///
    /// Returns once every task is terminal. A cycle among unresolved tasks
    /// aborts the plan with [`SwarmError::CycleDetected`], and a passed plan
    /// deadline with [`SwarmError::PlanTimeout`]. Either way in-flight
    /// invocations are dropped and their workers released in the monitor.
    pub async fn execute(&self, plan: &mut Plan) -> SwarmResult<ExecutionSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let deadline = self
            .config
            .plan_timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);
        plan.set_retention(self.config.retention());
        plan.set_phase(EnginePhase::Executing);
        info!(
            session = %plan.session_id(),
            tasks = plan.len(),
            max_concurrency = self.config.max_concurrency,
            "Execution started"
        );

        self.settle_unrunnable(plan);

        let timeout = self.config.task_timeout();
        let mut dispatched = 0;
        let mut in_flight = FuturesUnordered::new();

        loop {
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) && !plan.is_done() {
                drop(in_flight);
                return Err(self.abort_on_deadline(plan).await);
            }

            plan.promote_ready();

            if let Some(cycle) = plan.detect_cycle() {
                let ids: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
                error!(cycle = ?ids, in_flight = in_flight.len(), "Cycle detected, aborting plan");
                drop(in_flight);
                self.release_running(plan).await;
                plan.set_phase(EnginePhase::Aborted);
                return Err(SwarmError::CycleDetected { task_ids: cycle });
            }

            while in_flight.len() < self.config.max_concurrency {
                let Some(task) = plan.ready_tasks().into_iter().next() else {
                    break;
                };
                let id = task.id.clone();
                let Some(worker) = task.assigned_worker.clone() else {
                    plan.mark_failed(
                        &id,
                        TaskFailure::Unassignable {
                            reason: "no worker assigned".into(),
                        },
                    );
                    self.cascade_failure(plan, &id);
                    continue;
                };
                let input = self.enricher.enrich(task, plan);
                plan.mark_running(&id);
                self.monitor.start_task(&worker, &id).await;
                debug!(task_id = %id, worker = %worker, "Dispatching task");
                in_flight.push(invoke_with_timeout(
                    Arc::clone(&self.invoker),
                    worker,
                    input,
                    timeout,
                ));
                dispatched += 1;
            }

            if in_flight.is_empty() {
                if plan.is_done() {
                    break;
                }
                let stuck = plan.unresolved_ids();
                error!(stuck = stuck.len(), "No runnable tasks left, aborting plan");
                plan.set_phase(EnginePhase::Aborted);
                return Err(SwarmError::plan_validation(
                    "tasks can never become ready",
                    stuck,
                ));
            }

            let next = match deadline {
                Some(deadline) => {
                    let waited = tokio::time::timeout_at(deadline, in_flight.next()).await;
                    let Ok(next) = waited else {
                        drop(in_flight);
                        return Err(self.abort_on_deadline(plan).await);
                    };
                    next
                }
                None => in_flight.next().await,
            };
            if let Some(completed) = next {
                self.apply(plan, completed).await;
            }
        }

        plan.set_phase(EnginePhase::Synthesizing);
        let stats = plan.stats();
        let summary = ExecutionSummary {
            dispatched,
            succeeded: stats.succeeded,
            failed: stats.failed,
            skipped: stats.skipped,
            short_circuited: plan.is_short_circuited(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            session = %plan.session_id(),
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Execution complete"
        );
        Ok(summary)
    }

    async fn abort_on_deadline(&self, plan: &mut Plan) -> SwarmError {
        let timeout_ms = self.config.plan_timeout_ms.unwrap_or_default();
        let unresolved = plan.unresolved_ids();
        error!(
            session = %plan.session_id(),
            timeout_ms,
            unresolved = unresolved.len(),
            "Plan deadline passed, aborting plan"
        );
        self.release_running(plan).await;
        plan.mark_deadline_exceeded();
        plan.set_phase(EnginePhase::Aborted);
        SwarmError::PlanTimeout {
            timeout_ms,
            task_ids: unresolved,
        }
    }

    /// Tell the monitor that every running task was abandoned.
    async fn release_running(&self, plan: &Plan) {
        for task in plan.tasks().iter().filter(|t| t.status == TaskStatus::Running) {
            let Some(worker) = &task.assigned_worker else {
                continue;
            };
            let ran_ms = task
                .started_at
                .map(|at| (Utc::now() - at).num_milliseconds())
                .and_then(|ms| u64::try_from(ms).ok())
                .unwrap_or(0);
            self.monitor
                .finish_task(worker, &task.id, Completion::Abandoned, ran_ms)
                .await;
        }
    }

    /// Fail tasks routing never assigned, and skip everything downstream of a
    /// task that is already failed.
    fn settle_unrunnable(&self, plan: &mut Plan) {
        let unrouted: Vec<TaskId> = plan
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();
        for id in unrouted {
            warn!(task_id = %id, "Task reached execution without a worker");
            plan.mark_failed(
                &id,
                TaskFailure::Unassignable {
                    reason: "no worker assigned".into(),
                },
            );
        }

        let failed: Vec<TaskId> = plan
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id.clone())
            .collect();
        for id in failed {
            self.cascade_failure(plan, &id);
        }
    }

    fn cascade_failure(&self, plan: &mut Plan, id: &TaskId) {
        let skipped = plan.skip_dependents(
            id,
            SkipReason::UpstreamFailed {
                task_id: id.clone(),
            },
        );
        if !skipped.is_empty() {
            info!(task_id = %id, skipped = skipped.len(), "Skipped dependents of failed task");
        }
    }

    async fn apply(&self, plan: &mut Plan, completed: Completed) {
        let Completed {
            task_id,
            worker,
            elapsed,
            outcome,
        } = completed;
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let failure = match outcome {
            Err(_) => Some(TaskFailure::Timeout {
                timeout_ms: self.config.task_timeout_ms,
            }),
            Ok(Err(e)) => Some(TaskFailure::Worker {
                worker: worker.clone(),
                message: e.to_string(),
            }),
            Ok(Ok(outcome)) if !outcome.success => Some(TaskFailure::Worker {
                worker: worker.clone(),
                message: outcome
                    .error
                    .unwrap_or_else(|| "worker reported failure".into()),
            }),
            Ok(Ok(outcome)) => {
                let completion = if outcome.is_empty {
                    Completion::Empty
                } else {
                    Completion::Succeeded
                };
                self.monitor
                    .finish_task(&worker, &task_id, completion, elapsed_ms)
                    .await;
                self.succeed(plan, &task_id, outcome);
                None
            }
        };

        if let Some(failure) = failure {
            let completion = match failure {
                TaskFailure::Timeout { .. } => Completion::TimedOut,
                _ => Completion::Failed,
            };
            self.monitor
                .finish_task(&worker, &task_id, completion, elapsed_ms)
                .await;
            warn!(task_id = %task_id, worker = %worker, error = %failure, "Task failed");
            plan.mark_failed(&task_id, failure);
            self.cascade_failure(plan, &task_id);
        }
    }

    fn succeed(&self, plan: &mut Plan, task_id: &TaskId, outcome: WorkerOutcome) {
        let is_empty = outcome.is_empty;
        let payload = outcome.payload;
        plan.mark_succeeded(task_id, payload.clone(), is_empty);
        if !is_empty {
            info!(task_id = %task_id, "Task succeeded");
            return;
        }

        let mut skipped = plan.skip_dependents(
            task_id,
            SkipReason::UpstreamEmpty {
                task_id: task_id.clone(),
            },
        );
        let global = self.config.short_circuit == ShortCircuitPolicy::Global;
        if global {
            let not_started: Vec<TaskId> = plan
                .tasks()
                .iter()
                .filter(|t| !t.is_terminal() && t.status != TaskStatus::Running)
                .map(|t| t.id.clone())
                .collect();
            for id in not_started {
                let reason = SkipReason::GlobalShortCircuit {
                    task_id: task_id.clone(),
                };
                if plan.mark_skipped(&id, reason) {
                    skipped.push(id);
                }
            }
        }

        warn!(
            task_id = %task_id,
            skipped = skipped.len(),
            global,
            "Task found nothing, short-circuiting"
        );
        if global || !skipped.is_empty() {
            let description = plan
                .get(task_id)
                .map(|t| t.description.clone())
                .unwrap_or_default();
            plan.record_short_circuit(ShortCircuit {
                task_id: task_id.clone(),
                description,
                payload,
                skipped,
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::monitor::WorkerStatus;
    use crate::registry::CapabilityRegistry;
    use crate::types::Task;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by task id; unknown ids succeed with their description.
    struct MapInvoker {
        outcomes: HashMap<String, WorkerOutcome>,
        delays: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
    }

    impl MapInvoker {
        fn new() -> Self {
            Self {
                outcomes: HashMap::new(),
                delays: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn outcome(mut self, id: &str, outcome: WorkerOutcome) -> Self {
            self.outcomes.insert(id.to_string(), outcome);
            self
        }

        fn delay(mut self, id: &str, ms: u64) -> Self {
            self.delays.insert(id.to_string(), ms);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkerInvoker for MapInvoker {
        async fn invoke(
            &self,
            _worker_name: &str,
            input: &EnrichedInput,
        ) -> SwarmResult<WorkerOutcome> {
            let id = input.task_id.to_string();
            self.calls.lock().unwrap().push(id.clone());
            if let Some(ms) = self.delays.get(&id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Ok(self
                .outcomes
                .get(&id)
                .cloned()
                .unwrap_or_else(|| WorkerOutcome::success(input.description.clone())))
        }
    }

    fn routed_plan(specs: &[(&str, &[&str])]) -> Plan {
        let mut plan = Plan::new("query", "s1", CapabilityRegistry::new());
        for (id, deps) in specs {
            let mut task =
                Task::with_id(*id, format!("Task {id}")).with_dependencies(deps.to_vec());
            task.assign("worker").unwrap();
            plan.add(task).unwrap();
        }
        plan
    }

    fn status(plan: &Plan, id: &str) -> TaskStatus {
        plan.get(&id.into()).unwrap().status
    }

    fn engine(invoker: Arc<MapInvoker>, config: EngineConfig) -> ExecutionEngine {
        ExecutionEngine::new(invoker, config)
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = routed_plan(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let summary = engine(invoker.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();

        assert_eq!(invoker.calls(), vec!["a", "b", "c"]);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(plan.phase(), EnginePhase::Synthesizing);
    }

    #[tokio::test]
    async fn test_cycle_aborts_without_invocations() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = routed_plan(&[("a", &["b"]), ("b", &["a"]), ("c", &["a"]), ("d", &[])]);
        let err = engine(invoker.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap_err();

        assert!(matches!(err, SwarmError::CycleDetected { .. }));
        assert!(invoker.calls().is_empty());
        assert_eq!(plan.phase(), EnginePhase::Aborted);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let invoker = Arc::new(
            MapInvoker::new().outcome("a", WorkerOutcome::failure("disk on fire")),
        );
        let mut plan = routed_plan(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let summary = engine(invoker.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();

        assert_eq!(status(&plan, "a"), TaskStatus::Failed);
        assert_eq!(status(&plan, "b"), TaskStatus::Skipped);
        assert_eq!(status(&plan, "c"), TaskStatus::Skipped);
        assert_eq!(status(&plan, "d"), TaskStatus::Succeeded);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert!(!summary.short_circuited);
        assert!(matches!(
            plan.get(&"a".into()).unwrap().failure(),
            Some(TaskFailure::Worker { message, .. }) if message == "disk on fire"
        ));
    }

    #[tokio::test]
    async fn test_empty_result_prunes_branch() {
        let invoker = Arc::new(
            MapInvoker::new().outcome("find", WorkerOutcome::empty("0 files matched *.rs")),
        );
        let mut plan = routed_plan(&[("find", &[]), ("read", &["find"]), ("other", &[])]);
        let summary = engine(invoker.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();

        assert_eq!(status(&plan, "find"), TaskStatus::Succeeded);
        assert_eq!(status(&plan, "read"), TaskStatus::Skipped);
        assert_eq!(status(&plan, "other"), TaskStatus::Succeeded);
        assert!(!invoker.calls().contains(&"read".to_string()));
        assert!(summary.short_circuited);
        let sc = &plan.short_circuits()[0];
        assert_eq!(sc.task_id, TaskId::from("find"));
        assert_eq!(sc.skipped, vec![TaskId::from("read")]);
    }

    #[tokio::test]
    async fn test_empty_leaf_does_not_flag_per_branch() {
        let invoker = Arc::new(MapInvoker::new().outcome("a", WorkerOutcome::empty("none")));
        let mut plan = routed_plan(&[("a", &[])]);
        let summary = engine(invoker, EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();
        assert!(!summary.short_circuited);
    }

    #[tokio::test]
    async fn test_global_short_circuit() {
        let invoker = Arc::new(
            MapInvoker::new()
                .outcome("a", WorkerOutcome::empty("none"))
                .delay("b", 50),
        );
        let mut plan = routed_plan(&[("a", &[]), ("b", &[]), ("c", &["b"]), ("d", &[])]);
        let config = EngineConfig::default()
            .with_max_concurrency(2)
            .with_short_circuit(ShortCircuitPolicy::Global);
        engine(invoker.clone(), config)
            .execute(&mut plan)
            .await
            .unwrap();

        // a and b start together; a's empty result stops c and d, b finishes.
        assert_eq!(status(&plan, "b"), TaskStatus::Succeeded);
        assert_eq!(status(&plan, "c"), TaskStatus::Skipped);
        assert_eq!(status(&plan, "d"), TaskStatus::Skipped);
        assert!(plan.is_short_circuited());
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_task() {
        let invoker = Arc::new(MapInvoker::new().delay("slow", 5_000));
        let mut plan = routed_plan(&[("slow", &[]), ("after", &["slow"]), ("fast", &[])]);
        let config = EngineConfig::default().with_task_timeout(Duration::from_millis(50));
        let started = Instant::now();
        engine(invoker, config).execute(&mut plan).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            plan.get(&"slow".into()).unwrap().failure(),
            Some(&TaskFailure::Timeout { timeout_ms: 50 })
        );
        assert_eq!(status(&plan, "after"), TaskStatus::Skipped);
        assert_eq!(status(&plan, "fast"), TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_priority_breaks_ties_when_saturated() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = Plan::new("query", "s1", CapabilityRegistry::new());
        for (id, priority) in [("a", 0), ("b", 0), ("c", 9)] {
            let mut task = Task::with_id(id, format!("Task {id}")).with_priority(priority);
            task.assign("worker").unwrap();
            plan.add(task).unwrap();
        }
        engine(invoker.clone(), EngineConfig::default().with_max_concurrency(1))
            .execute(&mut plan)
            .await
            .unwrap();
        assert_eq!(invoker.calls(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_unrouted_task_fails_and_cascades() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = Plan::new("query", "s1", CapabilityRegistry::new());
        plan.add(Task::with_id("a", "Unrouted")).unwrap();
        let mut b = Task::with_id("b", "Needs a").with_dependencies(["a"]);
        b.assign("worker").unwrap();
        plan.add(b).unwrap();

        engine(invoker.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();
        assert!(matches!(
            plan.get(&"a".into()).unwrap().failure(),
            Some(TaskFailure::Unassignable { .. })
        ));
        assert_eq!(status(&plan, "b"), TaskStatus::Skipped);
        assert!(invoker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dependency_results_reach_dependents() {
        struct Recorder(Mutex<Vec<EnrichedInput>>);

        #[async_trait]
        impl WorkerInvoker for Recorder {
            async fn invoke(
                &self,
                _worker_name: &str,
                input: &EnrichedInput,
            ) -> SwarmResult<WorkerOutcome> {
                self.0.lock().unwrap().push(input.clone());
                Ok(WorkerOutcome::success(format!("out-{}", input.task_id)))
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut plan = routed_plan(&[("a", &[]), ("b", &["a"])]);
        ExecutionEngine::new(recorder.clone(), EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();

        let inputs = recorder.0.lock().unwrap();
        assert_eq!(inputs[1].task_id, TaskId::from("b"));
        assert_eq!(
            inputs[1].dependency_results[0].payload,
            serde_json::json!("out-a")
        );
    }

    #[tokio::test]
    async fn test_monitor_records_outcomes() {
        let invoker = Arc::new(MapInvoker::new().outcome("b", WorkerOutcome::failure("boom")));
        let mut plan = routed_plan(&[("a", &[]), ("b", &[])]);
        let engine = engine(invoker, EngineConfig::default());
        engine.execute(&mut plan).await.unwrap();

        let metrics = engine.monitor().aggregate_metrics().await;
        assert_eq!(metrics.invocations, 2);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.failures, 1);
    }

    #[tokio::test]
    async fn test_plan_deadline_aborts_and_releases_workers() {
        let invoker = Arc::new(MapInvoker::new().delay("slow", 5_000));
        let mut plan = routed_plan(&[("slow", &[]), ("after", &["slow"]), ("quick", &[])]);
        let config = EngineConfig::default()
            .with_task_timeout(Duration::from_secs(10))
            .with_plan_timeout(Duration::from_millis(100));
        let engine = engine(invoker, config);
        let started = Instant::now();
        let err = engine.execute(&mut plan).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        match err {
            SwarmError::PlanTimeout {
                timeout_ms,
                task_ids,
            } => {
                assert_eq!(timeout_ms, 100);
                assert_eq!(task_ids, vec![TaskId::from("slow"), TaskId::from("after")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(status(&plan, "quick"), TaskStatus::Succeeded);
        assert_eq!(plan.phase(), EnginePhase::Aborted);
        assert!(plan.stats().deadline_exceeded);

        let worker = engine.monitor().get_state("worker").await.unwrap();
        assert!(worker.current_tasks.is_empty());
        assert_eq!(worker.status, WorkerStatus::Error);
        assert_eq!(worker.metrics.abandoned, 1);
    }

    #[tokio::test]
    async fn test_no_deadline_by_default() {
        let invoker = Arc::new(MapInvoker::new().delay("a", 30));
        let mut plan = routed_plan(&[("a", &[])]);
        engine(invoker, EngineConfig::default())
            .execute(&mut plan)
            .await
            .unwrap();
        assert!(!plan.stats().deadline_exceeded);
    }

    #[tokio::test]
    async fn test_result_retention_applies_during_execution() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = routed_plan(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        let config = EngineConfig::default()
            .with_max_concurrency(1)
            .with_result_retention(1, usize::MAX);
        engine(invoker.clone(), config)
            .execute(&mut plan)
            .await
            .unwrap();

        assert_eq!(invoker.calls(), vec!["a", "b", "c"]);
        let stats = plan.stats();
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.retained_results, 1);
        assert_eq!(stats.cleared_results, 2);
        assert_eq!(
            plan.get(&"c".into()).unwrap().payload(),
            Some(&serde_json::json!("Task c"))
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let invoker = Arc::new(MapInvoker::new());
        let mut plan = routed_plan(&[("a", &[])]);
        let err = engine(invoker, EngineConfig::default().with_max_concurrency(0))
            .execute(&mut plan)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
    }
}
