//! Dependency-aware task orchestration.
//!
//! A query is decomposed into tasks, each task is routed to one worker from a
//! capability registry, and the resulting dependency graph runs with bounded
//! concurrency, per-task timeouts, cycle detection and empty-result
//! short-circuiting. The outcomes are synthesized into a single report.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Top-level facade: `run(query, session_id) → Report`.
//! - [`Plan`] — Per-query task graph and recorded results.
//! - [`TaskPlan`] — Builds and validates plans from decomposition output.
//! - [`AgentRouter`] — Confidence- and capability-checked worker assignment.
//! - [`ExecutionEngine`] — The dependency-graph state machine.
//! - [`ContextEnricher`] — Injects upstream results into worker inputs.
//! - [`ResultSynthesizer`] — Deterministic report building.
//! - [`WorkerMonitor`] — Per-worker metrics.

/// Collaborator contracts: decomposition, routing proposals, worker invocation.
pub mod collaborators;
/// Engine configuration.
pub mod config;
/// Dependency-graph execution.
pub mod engine;
/// Worker input construction.
pub mod enricher;
/// Per-worker state and metrics.
pub mod monitor;
/// Top-level pipeline.
pub mod orchestrator;
/// Task graph and per-query state.
pub mod plan;
/// Worker capability catalog.
pub mod registry;
/// Worker assignment.
pub mod router;
/// Report building.
pub mod synthesizer;
/// Task, status and result types.
pub mod types;
/// Plan construction and structural validation.
pub mod validation;
/// Worker trait and pool.
pub mod worker;

pub use collaborators::{
    Decomposer, Decomposition, RawTask, RoutingProposal, RoutingProposer, WorkerInvoker,
    WorkerOutcome,
};
pub use config::{EngineConfig, ShortCircuitPolicy};
pub use engine::{ExecutionEngine, ExecutionSummary};
pub use enricher::{ContextEnricher, DependencyContext, EnrichedInput};
pub use monitor::{Completion, WorkerMetrics, WorkerMonitor, WorkerState, WorkerStatus};
pub use orchestrator::{Orchestrator, OrchestratorRun};
pub use plan::{Plan, PlanStats, RetentionLimits, ShortCircuit, CLEARED_PAYLOAD};
pub use registry::{CapabilityEntry, CapabilityRegistry, CapabilitySource};
pub use router::{AgentRouter, RoutingSummary};
pub use synthesizer::{Report, ResultSynthesizer, TaskOutcome};
pub use types::{EnginePhase, SkipReason, Task, TaskFailure, TaskResult, TaskStatus};
pub use validation::TaskPlan;
pub use worker::{Worker, WorkerPool};
