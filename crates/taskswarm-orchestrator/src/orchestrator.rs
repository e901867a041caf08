use crate::collaborators::{Decomposer, RoutingProposer, WorkerInvoker};
use crate::config::EngineConfig;
use crate::engine::{ExecutionEngine, ExecutionSummary};
use crate::monitor::WorkerMonitor;
use crate::plan::Plan;
use crate::registry::CapabilitySource;
use crate::router::{AgentRouter, RoutingSummary};
use crate::synthesizer::{Report, ResultSynthesizer};
use crate::types::EnginePhase;
use crate::validation::TaskPlan;
use crate::worker::WorkerPool;
use std::sync::Arc;
use std::time::Instant;
use taskswarm_core::{SwarmError, SwarmResult};
use tracing::{error, info};

/// Everything one run produced, for callers that want more than the report.
#[derive(Debug, Clone)]
pub struct OrchestratorRun {
    pub report: Report,
    /// The final plan, terminal or trivially resolved.
    pub plan: Plan,
    pub routing: RoutingSummary,
    /// `None` when the query was answered without tasks.
    pub execution: Option<ExecutionSummary>,
    /// Wall time of the whole run.
    pub duration_ms: u64,
}

/// Query in, report out: decompose → validate → route → execute → synthesize.
pub struct Orchestrator {
    decomposer: Arc<dyn Decomposer>,
    router: AgentRouter,
    engine: ExecutionEngine,
    registry: Arc<dyn CapabilitySource>,
    synthesizer: ResultSynthesizer,
}

impl Orchestrator {
    pub fn new(
        decomposer: Arc<dyn Decomposer>,
        proposer: Arc<dyn RoutingProposer>,
        invoker: Arc<dyn WorkerInvoker>,
        registry: Arc<dyn CapabilitySource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            decomposer,
            router: AgentRouter::new(proposer, config.min_confidence),
            engine: ExecutionEngine::new(invoker, config),
            registry,
            synthesizer: ResultSynthesizer,
        }
    }

    /// Use one pool as both the registry source and the invocation backend.
    pub fn with_worker_pool(
        decomposer: Arc<dyn Decomposer>,
        proposer: Arc<dyn RoutingProposer>,
        pool: Arc<WorkerPool>,
        config: EngineConfig,
    ) -> Self {
        Self::new(decomposer, proposer, pool.clone(), pool, config)
    }

    pub fn monitor(&self) -> &WorkerMonitor {
        self.engine.monitor()
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Run a query to its report. Fatal errors carry no partial results.
    pub async fn run(&self, query: &str, session_id: &str) -> SwarmResult<Report> {
        Ok(self.run_detailed(query, session_id).await?.report)
    }

    pub async fn run_detailed(&self, query: &str, session_id: &str) -> SwarmResult<OrchestratorRun> {
        let start = Instant::now();
        info!(session = %session_id, query = %query, "Orchestrator: starting run");

        // Registry is read once and frozen for this plan.
        let registry = self.registry.snapshot();
        for entry in registry.entries() {
            self.monitor().register(&entry.name).await;
        }

        info!(session = %session_id, phase = %EnginePhase::Planning, "Orchestrator: phase");
        let decomposition = self
            .decomposer
            .decompose(query, &registry)
            .await
            .map_err(|e| aborted(session_id, EnginePhase::Planning, e))?;
        let mut plan = TaskPlan::build(query, session_id, registry, decomposition)
            .map_err(|e| aborted(session_id, EnginePhase::Planning, e))?;

        if plan.is_trivial() {
            plan.set_phase(EnginePhase::Done);
            let report = self.synthesizer.synthesize(&plan)?;
            info!(session = %session_id, "Orchestrator: answered directly");
            return Ok(OrchestratorRun {
                report,
                plan,
                routing: RoutingSummary::default(),
                execution: None,
                duration_ms: elapsed_ms(start),
            });
        }

        plan.set_phase(EnginePhase::Routing);
        info!(session = %session_id, phase = %EnginePhase::Routing, "Orchestrator: phase");
        let routing = match self.router.route(&mut plan).await {
            Ok(summary) => summary,
            Err(e) => {
                plan.set_phase(EnginePhase::Aborted);
                return Err(aborted(session_id, EnginePhase::Routing, e));
            }
        };

        info!(session = %session_id, phase = %EnginePhase::Executing, "Orchestrator: phase");
        let execution = self
            .engine
            .execute(&mut plan)
            .await
            .map_err(|e| aborted(session_id, EnginePhase::Executing, e))?;

        info!(session = %session_id, phase = %EnginePhase::Synthesizing, "Orchestrator: phase");
        let report = match self.synthesizer.synthesize(&plan) {
            Ok(report) => report,
            Err(e) => {
                plan.set_phase(EnginePhase::Aborted);
                return Err(aborted(session_id, EnginePhase::Synthesizing, e));
            }
        };
        plan.set_phase(EnginePhase::Done);

        let duration_ms = elapsed_ms(start);
        info!(
            session = %session_id,
            duration_ms,
            tasks = plan.len(),
            short_circuited = plan.is_short_circuited(),
            "Orchestrator: run complete"
        );
        Ok(OrchestratorRun {
            report,
            plan,
            routing,
            execution: Some(execution),
            duration_ms,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn aborted(session_id: &str, phase: EnginePhase, err: SwarmError) -> SwarmError {
    error!(session = %session_id, phase = %phase, error = %err, "Orchestrator: run aborted");
    err
}
