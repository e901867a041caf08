//! Scripted scenarios: canned collaborator answers replayed through the real
//! engine.
//!
//! ```json
//! {
//!   "query": "analyze the rust files",
//!   "decomposition": {
//!     "tasks": [
//!       {"id": "f", "description": "Find Rust files", "operations": ["find_files"]},
//!       {"id": "g", "description": "Analyze files", "dependencies": ["f"]}
//!     ]
//!   },
//!   "proposals": [
//!     {"task_id": "f", "worker_name": "files", "confidence": 0.9},
//!     {"task_id": "g", "worker_name": "files", "confidence": 0.8}
//!   ],
//!   "outcomes": {
//!     "f": {"success": true, "payload": "0 files matched *.rs", "is_empty": true, "delay_ms": 20}
//!   }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use taskswarm_core::{SwarmError, SwarmResult, TaskId};
use taskswarm_orchestrator::{
    CapabilityEntry, CapabilityRegistry, Decomposer, Decomposition, EngineConfig, EnrichedInput,
    Orchestrator, RoutingProposal, RoutingProposer, Task, WorkerInvoker, WorkerOutcome,
};
use tracing::debug;

/// Worker outcome plus an optional artificial delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedOutcome {
    #[serde(flatten)]
    pub outcome: WorkerOutcome,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub query: String,
    pub decomposition: Decomposition,
    #[serde(default)]
    pub proposals: Vec<RoutingProposal>,
    #[serde(default)]
    pub outcomes: HashMap<TaskId, ScriptedOutcome>,
    /// Extra capability entries, registered after the configured ones.
    #[serde(default)]
    pub workers: Vec<CapabilityEntry>,
}

impl Scenario {
    pub fn load(path: &Path) -> SwarmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Configured workers first; scenario entries replace same-named ones.
    pub fn registry(&self, base: &CapabilityRegistry) -> CapabilityRegistry {
        let mut registry = base.clone();
        for entry in &self.workers {
            registry.register(entry.clone());
        }
        registry
    }

    /// Wire the scripted collaborators into an orchestrator.
    pub fn into_orchestrator(self, base: &CapabilityRegistry, config: EngineConfig) -> Orchestrator {
        let registry = self.registry(base);
        Orchestrator::new(
            Arc::new(ScriptedDecomposer(self.decomposition)),
            Arc::new(ScriptedProposer(self.proposals)),
            Arc::new(ScriptedInvoker {
                outcomes: self.outcomes,
            }),
            Arc::new(registry),
            config,
        )
    }
}

pub struct ScriptedDecomposer(pub Decomposition);

#[async_trait]
impl Decomposer for ScriptedDecomposer {
    async fn decompose(
        &self,
        _query: &str,
        _registry: &CapabilityRegistry,
    ) -> SwarmResult<Decomposition> {
        Ok(self.0.clone())
    }
}

pub struct ScriptedProposer(pub Vec<RoutingProposal>);

#[async_trait]
impl RoutingProposer for ScriptedProposer {
    async fn propose(
        &self,
        _tasks: &[Task],
        _registry: &CapabilityRegistry,
    ) -> SwarmResult<Vec<RoutingProposal>> {
        Ok(self.0.clone())
    }
}

/// Answers from the scenario's outcome table, keyed by task id.
pub struct ScriptedInvoker {
    pub outcomes: HashMap<TaskId, ScriptedOutcome>,
}

#[async_trait]
impl WorkerInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        worker_name: &str,
        input: &EnrichedInput,
    ) -> SwarmResult<WorkerOutcome> {
        let scripted = self.outcomes.get(&input.task_id).ok_or_else(|| {
            SwarmError::Worker(format!(
                "no scripted outcome for task {} on worker '{worker_name}'",
                input.task_id
            ))
        })?;
        debug!(
            task_id = %input.task_id,
            worker = %worker_name,
            delay_ms = scripted.delay_ms,
            "Replaying scripted outcome"
        );
        if scripted.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(scripted.delay_ms)).await;
        }
        Ok(scripted.outcome.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use taskswarm_orchestrator::{Report, TaskStatus};

    const EMPTY_FIND: &str = r#"{
        "query": "analyze the rust files",
        "decomposition": {
            "tasks": [
                {"id": "f", "description": "Find Rust files", "operations": ["find_files"]},
                {"id": "g", "description": "Analyze files", "operations": ["read", "analyze"], "dependencies": ["f"]}
            ]
        },
        "proposals": [
            {"task_id": "f", "worker_name": "files", "confidence": 0.9},
            {"task_id": "g", "worker_name": "files", "confidence": 0.8}
        ],
        "outcomes": {
            "f": {"success": true, "payload": "0 files matched *.rs", "is_empty": true, "delay_ms": 5}
        },
        "workers": [
            {"name": "files", "description": "File manager", "supports_multiple_operations": true}
        ]
    }"#;

    #[test]
    fn test_load_scenario() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp.as_file_mut(), "{EMPTY_FIND}").unwrap();

        let scenario = Scenario::load(tmp.path()).unwrap();
        assert_eq!(scenario.decomposition.tasks.len(), 2);
        assert_eq!(scenario.proposals.len(), 2);
        let f = &scenario.outcomes[&TaskId::from("f")];
        assert!(f.outcome.is_empty);
        assert_eq!(f.delay_ms, 5);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp.as_file_mut(), "not json").unwrap();
        let err = Scenario::load(tmp.path()).unwrap_err();
        assert!(matches!(err, SwarmError::Json(_)));
    }

    #[test]
    fn test_scenario_workers_override_config() {
        let scenario: Scenario = serde_json::from_str(EMPTY_FIND).unwrap();
        let base: CapabilityRegistry = [
            CapabilityEntry::new("files", "Single-op files"),
            CapabilityEntry::new("search", "Web search"),
        ]
        .into_iter()
        .collect();
        let registry = scenario.registry(&base);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("files").unwrap().supports_multiple_operations);
    }

    #[tokio::test]
    async fn test_replay_through_engine() {
        let scenario: Scenario = serde_json::from_str(EMPTY_FIND).unwrap();
        let query = scenario.query.clone();
        let orchestrator =
            scenario.into_orchestrator(&CapabilityRegistry::new(), EngineConfig::default());
        let run = orchestrator.run_detailed(&query, "cli-test").await.unwrap();

        assert_eq!(
            run.plan.get(&"g".into()).unwrap().status,
            TaskStatus::Skipped
        );
        assert!(matches!(run.report, Report::ShortCircuit { .. }));
    }

    #[tokio::test]
    async fn test_missing_outcome_fails_task() {
        let invoker = ScriptedInvoker {
            outcomes: HashMap::new(),
        };
        let input = EnrichedInput {
            task_id: "x".into(),
            query: "q".into(),
            description: "Unscripted".into(),
            operations: Vec::new(),
            dependency_results: Vec::new(),
        };
        let err = invoker.invoke("files", &input).await.unwrap_err();
        assert!(err.to_string().contains("no scripted outcome for task x"));
    }
}
