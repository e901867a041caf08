use crate::collaborators::{RoutingProposal, RoutingProposer};
use crate::plan::Plan;
use crate::registry::CapabilityRegistry;
use crate::types::{Task, TaskFailure, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use taskswarm_core::{SwarmResult, TaskId};
use tracing::{debug, info, warn};

/// What routing did to a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSummary {
    /// `(task, worker)` pairs, in plan order.
    pub assigned: Vec<(TaskId, String)>,
    /// `(task, reason)` pairs for tasks that ended `Failed`.
    pub unassignable: Vec<(TaskId, String)>,
    /// Proposals naming a task that is unknown or not pending.
    pub ignored: usize,
}

/// Binds each pending task to exactly one worker.
pub struct AgentRouter {
    proposer: Arc<dyn RoutingProposer>,
    min_confidence: f64,
}

impl AgentRouter {
    pub fn new(proposer: Arc<dyn RoutingProposer>, min_confidence: f64) -> Self {
        Self {
            proposer,
            min_confidence,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Ask the proposer about every pending task and apply the answer.
    pub async fn route(&self, plan: &mut Plan) -> SwarmResult<RoutingSummary> {
        let pending: Vec<Task> = plan
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(RoutingSummary::default());
        }

        let proposals = self.proposer.propose(&pending, plan.registry()).await?;
        debug!(
            tasks = pending.len(),
            proposals = proposals.len(),
            "Received routing proposals"
        );
        Ok(self.apply(plan, proposals))
    }

    /// Accept or reject each proposal. A pending task with no acceptable
    /// proposal is failed as unassignable.
    pub fn apply(&self, plan: &mut Plan, proposals: Vec<RoutingProposal>) -> RoutingSummary {
        let mut summary = RoutingSummary::default();
        let mut by_task: HashMap<TaskId, Vec<RoutingProposal>> = HashMap::new();
        for proposal in proposals {
            match plan.get(&proposal.task_id) {
                Some(task) if task.status == TaskStatus::Pending => {
                    by_task
                        .entry(proposal.task_id.clone())
                        .or_default()
                        .push(proposal);
                }
                _ => {
                    warn!(
                        task_id = %proposal.task_id,
                        worker = %proposal.worker_name,
                        "Ignoring proposal for unknown or already routed task"
                    );
                    summary.ignored += 1;
                }
            }
        }

        let pending: Vec<TaskId> = plan
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.id.clone())
            .collect();

        for id in pending {
            let candidates = by_task.remove(&id).unwrap_or_default();
            match self.select(plan, &id, &candidates) {
                Ok(worker) => {
                    if let Some(task) = plan.get_mut(&id) {
                        match task.assign(worker.clone()) {
                            Ok(()) => {
                                info!(task_id = %id, worker = %worker, "Task assigned");
                                summary.assigned.push((id, worker));
                            }
                            Err(e) => warn!(task_id = %id, error = %e, "Assignment refused"),
                        }
                    }
                }
                Err(reason) => {
                    warn!(task_id = %id, reason = %reason, "Task unassignable");
                    plan.mark_failed(
                        &id,
                        TaskFailure::Unassignable {
                            reason: reason.clone(),
                        },
                    );
                    summary.unassignable.push((id, reason));
                }
            }
        }
        summary
    }

    /// Highest-confidence acceptable proposal; the first one wins a tie.
    fn select(
        &self,
        plan: &Plan,
        id: &TaskId,
        candidates: &[RoutingProposal],
    ) -> Result<String, String> {
        let Some(task) = plan.get(id) else {
            return Err(format!("unknown task {id}"));
        };
        if candidates.is_empty() {
            return Err("no worker proposed".into());
        }

        let mut best: Option<(&RoutingProposal, f64)> = None;
        let mut rejections = Vec::new();
        for proposal in candidates {
            match self.evaluate(task, proposal, plan.registry()) {
                Ok(confidence) => {
                    if best.map_or(true, |(_, c)| confidence > c) {
                        best = Some((proposal, confidence));
                    }
                }
                Err(reason) => rejections.push(reason),
            }
        }
        match best {
            Some((proposal, _)) => Ok(proposal.worker_name.clone()),
            None => Err(rejections.join("; ")),
        }
    }

    /// Check one proposal against the registry and the confidence floor.
    pub fn evaluate(
        &self,
        task: &Task,
        proposal: &RoutingProposal,
        registry: &CapabilityRegistry,
    ) -> Result<f64, String> {
        let worker = &proposal.worker_name;
        let Some(confidence) = proposal.confidence else {
            return Err(format!("worker '{worker}' proposed without confidence"));
        };
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "worker '{worker}' confidence {confidence} is outside [0, 1]"
            ));
        }
        if confidence < self.min_confidence {
            return Err(format!(
                "worker '{worker}' confidence {confidence} is below {}",
                self.min_confidence
            ));
        }
        let Some(entry) = registry.get(worker) else {
            return Err(format!("worker '{worker}' is not registered"));
        };
        if !entry.can_execute(&task.operations) {
            return Err(format!(
                "worker '{worker}' cannot run {} operations in one task",
                task.operations.len()
            ));
        }
        Ok(confidence)
    }
}
