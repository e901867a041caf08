//! `taskswarm.toml` loading.
//!
//! ```toml
//! [engine]
//! max_concurrency = 4
//! task_timeout_ms = 30000
//! min_confidence = 0.5
//! short_circuit = "per_branch"
//! plan_timeout_ms = 60000
//! max_retained_results = 1000
//! max_result_bytes = 52428800
//!
//! [[workers]]
//! name = "files"
//! description = "Lists, reads and searches files"
//! supports_multiple_operations = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use taskswarm_core::{SwarmError, SwarmResult};
use taskswarm_orchestrator::{CapabilityEntry, CapabilityRegistry, EngineConfig};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub workers: Vec<CapabilityEntry>,
}

impl AppConfig {
    /// Registry built from the `[[workers]]` entries, in file order.
    pub fn registry(&self) -> CapabilityRegistry {
        self.workers.iter().cloned().collect()
    }

    /// Apply command-line overrides, then re-validate.
    pub fn with_overrides(
        mut self,
        max_concurrency: Option<usize>,
        timeout_ms: Option<u64>,
    ) -> SwarmResult<Self> {
        if let Some(max) = max_concurrency {
            self.engine.max_concurrency = max;
        }
        if let Some(ms) = timeout_ms {
            self.engine.task_timeout_ms = ms;
        }
        self.engine.validate()?;
        Ok(self)
    }
}

/// Parse and validate a config file.
pub fn parse_config(path: &Path) -> SwarmResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SwarmError::Config(format!(
            "Failed to parse config '{}': {e}",
            path.display()
        ))
    })?;
    config.engine.validate()?;
    Ok(config)
}

/// Like [`parse_config`], but a missing file yields the defaults.
pub fn load_or_default(path: &Path) -> SwarmResult<AppConfig> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }
    parse_config(path)
}
