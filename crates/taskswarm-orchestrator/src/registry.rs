use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Catalog entry describing one worker's capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub description: String,
    /// Whether one task may hand this worker more than one operation.
    #[serde(default)]
    pub supports_multiple_operations: bool,
}

impl CapabilityEntry {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            supports_multiple_operations: false,
        }
    }

    /// Mark the worker as able to run several operations per task.
    pub fn multi_operation(mut self) -> Self {
        self.supports_multiple_operations = true;
        self
    }

    /// Deterministic capability check for a task's operation list.
    pub fn can_execute(&self, operations: &[String]) -> bool {
        operations.len() <= 1 || self.supports_multiple_operations
    }
}

/// Immutable-per-plan catalog of workers, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityRegistry {
    entries: Vec<CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any previous entry with the same name.
    pub fn register(&mut self, entry: CapabilityEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == entry.name) {
            debug!(worker = %entry.name, "Replacing capability entry");
            *existing = entry;
        } else {
            info!(worker = %entry.name, "Registered capability");
            self.entries.push(entry);
        }
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per worker, suitable for a decomposition or routing prompt.
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let ops = if e.supports_multiple_operations {
                    "multiple operations"
                } else {
                    "single operation"
                };
                format!("- {}: {} ({ops})", e.name, e.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<CapabilityEntry> for CapabilityRegistry {
    fn from_iter<I: IntoIterator<Item = CapabilityEntry>>(iter: I) -> Self {
        let mut registry = Self::new();
        for entry in iter {
            registry.register(entry);
        }
        registry
    }
}

/// Read-only source of registry snapshots, consulted once per plan.
pub trait CapabilitySource: Send + Sync {
    fn snapshot(&self) -> CapabilityRegistry;
}

impl CapabilitySource for CapabilityRegistry {
    fn snapshot(&self) -> CapabilityRegistry {
        self.clone()
    }
}
