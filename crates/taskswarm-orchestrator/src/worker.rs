use crate::collaborators::{WorkerInvoker, WorkerOutcome};
use crate::enricher::EnrichedInput;
use crate::registry::{CapabilityEntry, CapabilityRegistry, CapabilitySource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use taskswarm_core::{SwarmError, SwarmResult};
use tracing::{debug, info};

/// A specialized worker that performs the operations of one task.
#[async_trait]
pub trait Worker: Send + Sync {
    fn descriptor(&self) -> &CapabilityEntry;

    async fn invoke(&self, input: &EnrichedInput) -> SwarmResult<WorkerOutcome>;
}

/// Workers registered by name. Doubles as the registry source and the
/// invocation backend for the engine.
pub struct WorkerPool {
    workers: HashMap<String, Arc<dyn Worker>>,
    order: Vec<String>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.descriptor().name.clone();
        info!(worker = %name, "Registered worker");
        if self.workers.insert(name.clone(), worker).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.get(name)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilitySource for WorkerPool {
    fn snapshot(&self) -> CapabilityRegistry {
        self.order
            .iter()
            .filter_map(|name| self.workers.get(name))
            .map(|w| w.descriptor().clone())
            .collect()
    }
}

#[async_trait]
impl WorkerInvoker for WorkerPool {
    async fn invoke(
        &self,
        worker_name: &str,
        input: &EnrichedInput,
    ) -> SwarmResult<WorkerOutcome> {
        let worker = self
            .workers
            .get(worker_name)
            .ok_or_else(|| SwarmError::Worker(format!("Unknown worker: {worker_name}")))?;
        debug!(worker = %worker_name, task_id = %input.task_id, "Invoking worker");
        worker.invoke(input).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use taskswarm_core::TaskId;

    struct EchoWorker {
        descriptor: CapabilityEntry,
    }

    #[async_trait]
    impl Worker for EchoWorker {
        fn descriptor(&self) -> &CapabilityEntry {
            &self.descriptor
        }

        async fn invoke(&self, input: &EnrichedInput) -> SwarmResult<WorkerOutcome> {
            Ok(WorkerOutcome::success(input.description.clone()))
        }
    }

    fn echo(name: &str) -> Arc<dyn Worker> {
        Arc::new(EchoWorker {
            descriptor: CapabilityEntry::new(name, "Echoes the description"),
        })
    }

    fn input() -> EnrichedInput {
        EnrichedInput {
            task_id: TaskId::from("t1"),
            query: "list files".into(),
            description: "List the files".into(),
            operations: vec!["list".into()],
            dependency_results: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_invoke_registered_worker() {
        let mut pool = WorkerPool::new();
        pool.register(echo("files"));
        let outcome = pool.invoke("files", &input()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.payload, serde_json::json!("List the files"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_worker() {
        let pool = WorkerPool::new();
        let err = pool.invoke("ghost", &input()).await.unwrap_err();
        assert!(matches!(err, SwarmError::Worker(_)));
        assert!(err.to_string().contains("Unknown worker: ghost"));
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut pool = WorkerPool::new();
        pool.register(echo("search"));
        pool.register(echo("files"));
        pool.register(echo("search"));

        let registry = pool.snapshot();
        assert_eq!(pool.worker_count(), 2);
        let names: Vec<&str> = registry.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["search", "files"]);
        assert!(pool.get("files").is_some());
    }
}
