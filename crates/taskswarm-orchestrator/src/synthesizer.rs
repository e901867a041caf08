use crate::plan::Plan;
use crate::types::{TaskResult, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskswarm_core::{SwarmError, SwarmResult, TaskId};

/// Final outcome of one task, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub description: String,
    pub worker: Option<String>,
    pub status: TaskStatus,
    /// Worker payload when the task succeeded.
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub is_empty: bool,
    /// Failure or skip reason.
    pub error: Option<String>,
}

/// What the caller of `run` receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    /// The query needed no tasks.
    DirectAnswer { answer: String },
    /// An empty result stopped part of the plan. The message also lists
    /// every failed task.
    ShortCircuit { message: String },
    /// Per-task outcomes in dependency order.
    Outcomes {
        outcomes: Vec<TaskOutcome>,
        summary: String,
    },
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::DirectAnswer { answer } => write!(f, "{answer}"),
            Report::ShortCircuit { message } => write!(f, "{message}"),
            Report::Outcomes { outcomes, summary } => {
                for outcome in outcomes {
                    writeln!(
                        f,
                        "[{}] {} ({})",
                        outcome.status, outcome.description, outcome.task_id
                    )?;
                    if let Some(payload) = &outcome.payload {
                        writeln!(f, "  {}", render_payload(payload))?;
                    }
                    if let Some(error) = &outcome.error {
                        writeln!(f, "  {error}")?;
                    }
                }
                write!(f, "{summary}")
            }
        }
    }
}

fn render_payload(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Turns a terminal plan into a [`Report`]. Holds no state, so synthesizing
/// the same plan twice yields the same report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultSynthesizer;

impl ResultSynthesizer {
    pub fn synthesize(&self, plan: &Plan) -> SwarmResult<Report> {
        if let (true, Some(answer)) = (plan.is_trivial(), plan.direct_answer()) {
            return Ok(Report::DirectAnswer {
                answer: answer.to_string(),
            });
        }
        if !plan.is_done() {
            return Err(SwarmError::State(format!(
                "cannot synthesize: {} task(s) unresolved",
                plan.unresolved_ids().len()
            )));
        }
        if plan.is_short_circuited() {
            return Ok(Report::ShortCircuit {
                message: short_circuit_message(plan),
            });
        }

        let outcomes: Vec<TaskOutcome> = plan
            .execution_levels()
            .into_iter()
            .flatten()
            .filter_map(|id| plan.get(&id))
            .map(|task| {
                let (payload, is_empty, error) = match &task.result {
                    Some(TaskResult::Succeeded { payload, is_empty }) => {
                        (Some(payload.clone()), *is_empty, None)
                    }
                    Some(TaskResult::Failed { failure }) => (None, false, Some(failure.to_string())),
                    Some(TaskResult::Skipped { reason }) => (None, false, Some(reason.to_string())),
                    None => (None, false, None),
                };
                TaskOutcome {
                    task_id: task.id.clone(),
                    description: task.description.clone(),
                    worker: task.assigned_worker.clone(),
                    status: task.status,
                    payload,
                    is_empty,
                    error,
                }
            })
            .collect();

        let stats = plan.stats();
        let summary = format!(
            "{} task(s): {} succeeded, {} failed, {} skipped",
            stats.total, stats.succeeded, stats.failed, stats.skipped
        );
        Ok(Report::Outcomes { outcomes, summary })
    }
}

/// One line per short circuit, then one line per failed task so failures in
/// branches that kept running still reach the caller.
fn short_circuit_message(plan: &Plan) -> String {
    let mut lines: Vec<String> = plan
        .short_circuits()
        .iter()
        .map(|sc| {
            let mut line = format!(
                "Stopped early: task '{}' ({}) found nothing",
                sc.description, sc.task_id
            );
            match &sc.payload {
                serde_json::Value::Null => {}
                serde_json::Value::String(text) if text.is_empty() => {}
                payload => line.push_str(&format!(": {}", render_payload(payload))),
            }
            if !sc.skipped.is_empty() {
                let ids: Vec<&str> = sc.skipped.iter().map(TaskId::as_str).collect();
                line.push_str(&format!(
                    "; skipped {} task(s): {}",
                    ids.len(),
                    ids.join(", ")
                ));
            }
            line
        })
        .collect();

    for task in plan
        .execution_levels()
        .into_iter()
        .flatten()
        .filter_map(|id| plan.get(&id))
    {
        if let Some(failure) = task.failure() {
            lines.push(format!(
                "Failed: task '{}' ({}): {failure}",
                task.description, task.id
            ));
        }
    }
    lines.join("\n")
}
