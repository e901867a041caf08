use crate::collaborators::{Decomposition, RawTask};
use crate::plan::Plan;
use crate::registry::CapabilityRegistry;
use std::collections::HashSet;
use taskswarm_core::{SwarmError, SwarmResult, TaskId};
use tracing::{debug, info, warn};

/// Builds validated plans from decomposition output.
///
/// A plan that fails validation is never returned, so nothing partial reaches
/// the router.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPlan;

impl TaskPlan {
    /// Shortest accepted task description, in characters.
    pub const MIN_DESCRIPTION_LEN: usize = 3;

    /// Turn a decomposition into a plan.
    ///
    /// Zero tasks plus a direct answer yields a trivially resolved plan.
    /// Zero tasks and no answer is a decomposition error. When tasks are
    /// present any direct answer is ignored.
    pub fn build(
        query: &str,
        session_id: &str,
        registry: CapabilityRegistry,
        decomposition: Decomposition,
    ) -> SwarmResult<Plan> {
        let mut plan = Plan::new(query, session_id, registry);

        if decomposition.tasks.is_empty() {
            // A blank answer is no answer.
            let answer = decomposition
                .direct_answer
                .filter(|answer| !answer.trim().is_empty());
            return match answer {
                Some(answer) => {
                    info!(session = %session_id, "Query resolved without tasks");
                    plan.set_direct_answer(answer);
                    Ok(plan)
                }
                None => Err(SwarmError::Decomposition(
                    "decomposition returned no tasks and no direct answer".into(),
                )),
            };
        }
        if decomposition.direct_answer.is_some() {
            debug!("Ignoring direct answer; decomposition also returned tasks");
        }

        let tasks: Vec<_> = decomposition
            .tasks
            .into_iter()
            .map(RawTask::into_task)
            .collect();

        let short: Vec<TaskId> = tasks
            .iter()
            .filter(|t| t.description.trim().chars().count() < Self::MIN_DESCRIPTION_LEN)
            .map(|t| t.id.clone())
            .collect();
        if !short.is_empty() {
            return Err(SwarmError::plan_validation(
                format!(
                    "task description shorter than {} characters",
                    Self::MIN_DESCRIPTION_LEN
                ),
                short,
            ));
        }

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for task in &tasks {
            if !seen.insert(task.id.clone()) && !duplicates.contains(&task.id) {
                duplicates.push(task.id.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(SwarmError::plan_validation("duplicate task id", duplicates));
        }

        for task in tasks {
            plan.add(task)?;
        }
        Self::validate(&plan)?;

        info!(
            session = %session_id,
            task_count = plan.len(),
            "Plan validated"
        );
        Ok(plan)
    }

    /// Structural checks: dependencies resolve within the plan and the graph
    /// is acyclic.
    pub fn validate(plan: &Plan) -> SwarmResult<()> {
        let mut offenders = Vec::new();
        let mut missing: Vec<TaskId> = Vec::new();
        for task in plan.tasks() {
            let unknown: Vec<&TaskId> = task
                .dependencies
                .iter()
                .filter(|dep| !plan.contains(dep))
                .collect();
            if !unknown.is_empty() {
                offenders.push(task.id.clone());
                for dep in unknown {
                    if !missing.contains(dep) {
                        missing.push(dep.clone());
                    }
                }
            }
        }
        if !offenders.is_empty() {
            let missing: Vec<&str> = missing.iter().map(TaskId::as_str).collect();
            warn!(missing = ?missing, "Plan has dangling dependencies");
            return Err(SwarmError::plan_validation(
                format!("dangling dependency on unknown id(s) {}", missing.join(", ")),
                offenders,
            ));
        }

        if let Some(cycle) = plan.static_cycle() {
            warn!(cycle_len = cycle.len(), "Plan has a dependency cycle");
            return Err(SwarmError::plan_validation("dependency cycle", cycle));
        }
        Ok(())
    }
}
