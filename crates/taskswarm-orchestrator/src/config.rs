use crate::plan::RetentionLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskswarm_core::{SwarmError, SwarmResult};

/// How far an empty result prunes the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortCircuitPolicy {
    /// Only transitive dependents of the empty task are skipped.
    #[default]
    PerBranch,
    /// Every task that has not started yet is skipped.
    Global,
}

/// Engine knobs. Loaded from the `[engine]` section of `taskswarm.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of tasks running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-task timeout in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Routing proposals below this confidence are rejected.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default)]
    pub short_circuit: ShortCircuitPolicy,
    /// Deadline for a whole `execute` call. `None` means no deadline.
    #[serde(default)]
    pub plan_timeout_ms: Option<u64>,
    /// Succeeded results kept with their payload; older ones are cleared.
    #[serde(default = "default_max_retained_results")]
    pub max_retained_results: usize,
    /// Total serialized payload size kept across succeeded results.
    #[serde(default = "default_max_result_bytes")]
    pub max_result_bytes: usize,
}

fn default_max_concurrency() -> usize {
    10
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_max_retained_results() -> usize {
    1000
}

fn default_max_result_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_ms: default_task_timeout_ms(),
            min_confidence: default_min_confidence(),
            short_circuit: ShortCircuitPolicy::default(),
            plan_timeout_ms: None,
            max_retained_results: default_max_retained_results(),
            max_result_bytes: default_max_result_bytes(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_short_circuit(mut self, policy: ShortCircuitPolicy) -> Self {
        self.short_circuit = policy;
        self
    }

    pub fn with_plan_timeout(mut self, timeout: Duration) -> Self {
        self.plan_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_result_retention(mut self, max_results: usize, max_bytes: usize) -> Self {
        self.max_retained_results = max_results;
        self.max_result_bytes = max_bytes;
        self
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn plan_timeout(&self) -> Option<Duration> {
        self.plan_timeout_ms.map(Duration::from_millis)
    }

    pub fn retention(&self) -> RetentionLimits {
        RetentionLimits {
            max_results: self.max_retained_results,
            max_bytes: self.max_result_bytes,
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> SwarmResult<()> {
        if self.max_concurrency == 0 {
            return Err(SwarmError::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }
        if self.task_timeout_ms == 0 {
            return Err(SwarmError::Config(
                "task_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.plan_timeout_ms == Some(0) {
            return Err(SwarmError::Config(
                "plan_timeout_ms must be greater than 0 when set".into(),
            ));
        }
        if self.max_retained_results == 0 || self.max_result_bytes == 0 {
            return Err(SwarmError::Config(
                "max_retained_results and max_result_bytes must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SwarmError::Config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}
