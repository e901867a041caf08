//! Core types and error definitions for taskswarm.
//!
//! This crate provides the foundational types shared across all taskswarm
//! crates: the unified error type and the opaque task identifier.
//!
//! # Main types
//!
//! - [`SwarmError`] — Unified error enum for plan-level (fatal) failures.
//! - [`SwarmResult`] — Convenience alias for `Result<T, SwarmError>`.
//! - [`TaskId`] — Opaque identifier of a task within one plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for taskswarm.
///
/// Every variant is fatal to the plan that produced it. Failures local to a
/// single task are recorded on that task instead and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// The decomposed plan is malformed (dangling dependency, duplicate id,
    /// static cycle, invalid task record).
    #[error("Plan validation error: {reason} [{}]", join_ids(.task_ids))]
    PlanValidation {
        /// Human-readable explanation.
        reason: String,
        /// Offending task ids.
        task_ids: Vec<TaskId>,
    },

    /// A dependency cycle was found among unresolved tasks during execution.
    #[error("Cycle detected among tasks [{}]", join_ids(.task_ids))]
    CycleDetected {
        /// Tasks that form the cycle, in traversal order.
        task_ids: Vec<TaskId>,
    },

    /// The whole plan ran past its deadline.
    #[error("Plan timed out after {timeout_ms}ms with unresolved tasks [{}]", join_ids(.task_ids))]
    PlanTimeout {
        /// The configured plan deadline.
        timeout_ms: u64,
        /// Tasks that had not reached a terminal state.
        task_ids: Vec<TaskId>,
    },

    /// The decomposition collaborator failed or returned an unusable answer.
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// The routing collaborator failed.
    #[error("Routing error: {0}")]
    Routing(String),

    /// A worker could not be reached or reported a transport-level failure.
    #[error("Worker error: {0}")]
    Worker(String),

    /// An invariant of the task state machine was violated.
    #[error("State error: {0}")]
    State(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// Shorthand for a [`SwarmError::PlanValidation`] naming the given tasks.
    pub fn plan_validation(reason: impl Into<String>, task_ids: Vec<TaskId>) -> Self {
        Self::PlanValidation {
            reason: reason.into(),
            task_ids,
        }
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A convenience `Result` alias using [`SwarmError`].
pub type SwarmResult<T> = Result<T, SwarmError>;

// --- Identifiers ---

/// Opaque identifier of a task, unique within its plan.
///
/// Generated ids are 16 lowercase hex characters. Ids supplied by a
/// decomposition are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Length of a generated id.
    pub const GENERATED_LEN: usize = 16;

    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random 16-character hex id.
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(Self::GENERATED_LEN);
        Self(hex)
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
