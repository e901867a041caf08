use crate::registry::CapabilityRegistry;
use crate::types::{EnginePhase, SkipReason, Task, TaskFailure, TaskResult, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use taskswarm_core::{SwarmError, SwarmResult, TaskId};
use tracing::{debug, warn};

/// Payload left in place of a result cleared by retention.
pub const CLEARED_PAYLOAD: &str = "<result cleared to bound memory>";

/// An empty result that pruned part of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortCircuit {
    pub task_id: TaskId,
    pub description: String,
    /// What the worker returned alongside the empty flag.
    pub payload: serde_json::Value,
    /// Tasks skipped because of it, in plan order.
    pub skipped: Vec<TaskId>,
}

/// Caps on succeeded payloads kept in memory.
///
/// When either cap is exceeded, the oldest results that no unfinished task
/// still depends on are replaced by [`CLEARED_PAYLOAD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionLimits {
    pub max_results: usize,
    pub max_bytes: usize,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            max_results: usize::MAX,
            max_bytes: usize::MAX,
        }
    }
}

/// Task counts by status, plus retention and deadline bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub ready: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Succeeded results still holding their payload.
    pub retained_results: usize,
    /// Serialized size of the retained payloads.
    pub result_bytes: usize,
    pub cleared_results: usize,
    /// The plan deadline elapsed before every task finished.
    pub deadline_exceeded: bool,
}

/// Per-query state: the task graph plus everything the engine records while
/// running it.
#[derive(Debug, Clone)]
pub struct Plan {
    session_id: String,
    query: String,
    registry: CapabilityRegistry,
    phase: EnginePhase,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    results: BTreeMap<TaskId, TaskResult>,
    /// Visited set of the last cycle-detection pass.
    traversal: HashSet<TaskId>,
    short_circuits: Vec<ShortCircuit>,
    direct_answer: Option<String>,
    retention: RetentionLimits,
    /// Succeeded results with their payload size, oldest first.
    retained: VecDeque<(TaskId, usize)>,
    result_bytes: usize,
    cleared_results: usize,
    deadline_exceeded: bool,
}

impl Plan {
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        registry: CapabilityRegistry,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            registry,
            phase: EnginePhase::Planning,
            tasks: Vec::new(),
            index: HashMap::new(),
            results: BTreeMap::new(),
            traversal: HashSet::new(),
            short_circuits: Vec::new(),
            direct_answer: None,
            retention: RetentionLimits::default(),
            retained: VecDeque::new(),
            result_bytes: 0,
            cleared_results: 0,
            deadline_exceeded: false,
        }
    }

    /// Add a task. Ids must be unique within the plan.
    pub fn add(&mut self, task: Task) -> SwarmResult<()> {
        if self.index.contains_key(&task.id) {
            return Err(SwarmError::plan_validation(
                "duplicate task id",
                vec![task.id.clone()],
            ));
        }
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: EnginePhase) {
        self.phase = phase;
    }

    pub fn direct_answer(&self) -> Option<&str> {
        self.direct_answer.as_deref()
    }

    pub(crate) fn set_direct_answer(&mut self, answer: String) {
        self.direct_answer = Some(answer);
    }

    /// Resolved without any task: the direct answer is the whole result.
    pub fn is_trivial(&self) -> bool {
        self.tasks.is_empty() && self.direct_answer.is_some()
    }

    /// Tasks in decomposition order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        match self.index.get(id) {
            Some(&i) => self.tasks.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Terminal results keyed by task id.
    pub fn results(&self) -> &BTreeMap<TaskId, TaskResult> {
        &self.results
    }

    pub fn short_circuits(&self) -> &[ShortCircuit] {
        &self.short_circuits
    }

    pub fn is_short_circuited(&self) -> bool {
        !self.short_circuits.is_empty()
    }

    pub(crate) fn record_short_circuit(&mut self, short_circuit: ShortCircuit) {
        self.short_circuits.push(short_circuit);
    }

    pub fn retention(&self) -> RetentionLimits {
        self.retention
    }

    /// Apply new caps; results already over them are cleared now.
    pub fn set_retention(&mut self, limits: RetentionLimits) {
        self.retention = limits;
        self.enforce_retention();
    }

    pub(crate) fn mark_deadline_exceeded(&mut self) {
        self.deadline_exceeded = true;
    }

    pub fn succeeded_ids(&self) -> HashSet<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .map(|t| t.id.clone())
            .collect()
    }

    // ---- transitions; the engine is the only caller ----

    /// `Assigned → Ready` for every task whose dependencies have all
    /// succeeded. Returns the newly promoted ids.
    pub(crate) fn promote_ready(&mut self) -> Vec<TaskId> {
        let succeeded = self.succeeded_ids();
        let mut promoted = Vec::new();
        for task in &mut self.tasks {
            if task.status == TaskStatus::Assigned && task.is_ready(&succeeded) {
                task.status = TaskStatus::Ready;
                promoted.push(task.id.clone());
            }
        }
        promoted
    }

    pub(crate) fn mark_running(&mut self, id: &TaskId) -> bool {
        match self.get_mut(id) {
            Some(task) if task.status == TaskStatus::Ready => {
                task.status = TaskStatus::Running;
                task.started_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_succeeded(
        &mut self,
        id: &TaskId,
        payload: serde_json::Value,
        is_empty: bool,
    ) -> bool {
        let size = serde_json::to_vec(&payload).map_or(0, |bytes| bytes.len());
        let result = TaskResult::Succeeded { payload, is_empty };
        match self.get_mut(id) {
            Some(task) if task.status == TaskStatus::Running => {
                task.status = TaskStatus::Succeeded;
                task.result = Some(result.clone());
                task.finished_at = Some(Utc::now());
            }
            _ => return false,
        }
        self.results.insert(id.clone(), result);
        self.retained.push_back((id.clone(), size));
        self.result_bytes += size;
        self.enforce_retention();
        true
    }

    fn over_retention(&self) -> bool {
        self.retained.len() > self.retention.max_results
            || self.result_bytes > self.retention.max_bytes
    }

    /// Clear the oldest payloads until both caps hold. Results an unfinished
    /// task still depends on are kept, even over the caps.
    fn enforce_retention(&mut self) {
        let mut i = 0;
        while self.over_retention() && i < self.retained.len() {
            let id = self.retained[i].0.clone();
            if self.still_needed(&id) {
                i += 1;
                continue;
            }
            if let Some((id, size)) = self.retained.remove(i) {
                self.result_bytes -= size;
                self.clear_payload(&id);
            }
        }
        if self.over_retention() {
            warn!(
                retained = self.retained.len(),
                bytes = self.result_bytes,
                "Result retention over its limits; remaining results are still needed"
            );
        }
    }

    fn still_needed(&self, id: &TaskId) -> bool {
        self.tasks
            .iter()
            .any(|t| !t.is_terminal() && t.dependencies.contains(id))
    }

    fn clear_payload(&mut self, id: &TaskId) {
        let Some(task) = self.get_mut(id) else {
            return;
        };
        let Some(TaskResult::Succeeded { is_empty, .. }) = task.result else {
            return;
        };
        let cleared = TaskResult::Succeeded {
            payload: serde_json::Value::String(CLEARED_PAYLOAD.to_string()),
            is_empty,
        };
        task.result = Some(cleared.clone());
        self.results.insert(id.clone(), cleared);
        self.cleared_results += 1;
        debug!(task_id = %id, "Cleared retained result");
    }

    pub(crate) fn mark_failed(&mut self, id: &TaskId, failure: TaskFailure) -> bool {
        let result = TaskResult::Failed { failure };
        match self.get_mut(id) {
            Some(task) if !task.is_terminal() => {
                task.status = TaskStatus::Failed;
                task.result = Some(result.clone());
                task.finished_at = Some(Utc::now());
            }
            _ => return false,
        }
        self.results.insert(id.clone(), result);
        true
    }

    /// Only tasks that have not started can be skipped.
    pub(crate) fn mark_skipped(&mut self, id: &TaskId, reason: SkipReason) -> bool {
        let result = TaskResult::Skipped { reason };
        match self.get_mut(id) {
            Some(task) if !task.is_terminal() && task.status != TaskStatus::Running => {
                task.status = TaskStatus::Skipped;
                task.result = Some(result.clone());
                task.finished_at = Some(Utc::now());
            }
            _ => return false,
        }
        self.results.insert(id.clone(), result);
        true
    }

    /// Skip every transitive dependent of `id` that has not started.
    /// Returns the ids actually skipped, in plan order.
    pub(crate) fn skip_dependents(&mut self, id: &TaskId, reason: SkipReason) -> Vec<TaskId> {
        let mut skipped = Vec::new();
        for dependent in self.transitive_dependents(id) {
            if self.mark_skipped(&dependent, reason.clone()) {
                skipped.push(dependent);
            }
        }
        skipped
    }

    // ---- queries ----

    /// Ready tasks in dispatch order: higher priority first, then ascending id.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Ready)
            .collect();
        sort_for_dispatch(&mut ready);
        ready
    }

    /// Tasks that declare `id` as a direct dependency, in plan order.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.dependencies.contains(id))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Every task reachable downstream of `id`, in plan order.
    pub fn transitive_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut queue: VecDeque<TaskId> = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(&current) {
                if dependent != *id && seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        self.tasks
            .iter()
            .filter(|t| seen.contains(&t.id))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Ids not yet terminal, in plan order.
    pub fn unresolved_ids(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| !t.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Every task has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|t| t.is_terminal())
    }

    pub fn stats(&self) -> PlanStats {
        let mut stats = PlanStats {
            total: self.tasks.len(),
            retained_results: self.retained.len(),
            result_bytes: self.result_bytes,
            cleared_results: self.cleared_results,
            deadline_exceeded: self.deadline_exceeded,
            ..PlanStats::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::Ready => stats.ready += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Succeeded => stats.succeeded += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }

    // ---- cycle detection ----

    /// Look for a cycle among unresolved tasks, recording visited ids in the
    /// plan's traversal set. Returns the ids on the cycle, in path order.
    pub fn detect_cycle(&mut self) -> Option<Vec<TaskId>> {
        let mut traversal = std::mem::take(&mut self.traversal);
        traversal.clear();
        let cycle = self.find_cycle(|t| !t.is_terminal(), &mut traversal);
        self.traversal = traversal;
        cycle
    }

    /// Full static check over every task regardless of status.
    pub fn static_cycle(&self) -> Option<Vec<TaskId>> {
        self.find_cycle(|_| true, &mut HashSet::new())
    }

    /// Ids visited by the last [`Plan::detect_cycle`] pass.
    pub fn traversal(&self) -> &HashSet<TaskId> {
        &self.traversal
    }

    /// Iterative DFS; each frame holds a task and the index of the next
    /// dependency to visit.
    fn find_cycle<F>(&self, include: F, visited: &mut HashSet<TaskId>) -> Option<Vec<TaskId>>
    where
        F: Fn(&Task) -> bool,
    {
        for root in self.tasks.iter().filter(|t| include(t)) {
            if visited.contains(&root.id) {
                continue;
            }
            visited.insert(root.id.clone());
            let mut stack: Vec<(&Task, usize)> = vec![(root, 0)];
            let mut on_path: HashSet<&TaskId> = HashSet::from([&root.id]);

            while let Some(frame) = stack.last_mut() {
                let task: &Task = frame.0;
                let next = frame.1;
                frame.1 += 1;
                let Some(dep) = task.dependencies.get(next) else {
                    on_path.remove(&task.id);
                    stack.pop();
                    continue;
                };
                if on_path.contains(dep) {
                    // back edge
                    let start = stack.iter().position(|(t, _)| &t.id == dep).unwrap_or(0);
                    return Some(stack[start..].iter().map(|(t, _)| t.id.clone()).collect());
                }
                if visited.contains(dep) {
                    continue;
                }
                let Some(child) = self.get(dep).filter(|t| include(t)) else {
                    continue;
                };
                visited.insert(child.id.clone());
                on_path.insert(&child.id);
                stack.push((child, 0));
            }
        }
        None
    }

    // ---- ordering and rendering ----

    /// Kahn layering of the dependency graph. Within a level, higher priority
    /// first, then ascending id. Tasks left on a cycle form a final level.
    pub fn execution_levels(&self) -> Vec<Vec<TaskId>> {
        let mut in_degree: HashMap<&TaskId, usize> = self
            .tasks
            .iter()
            .map(|t| {
                let known = t.dependencies.iter().filter(|d| self.contains(d)).count();
                (&t.id, known)
            })
            .collect();

        let mut levels = Vec::new();
        let mut placed = 0;
        let mut current: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| in_degree.get(&t.id) == Some(&0))
            .collect();

        while !current.is_empty() {
            sort_for_dispatch(&mut current);
            placed += current.len();
            let mut next: Vec<&Task> = Vec::new();
            for task in &current {
                for dependent in self.tasks.iter().filter(|t| t.dependencies.contains(&task.id)) {
                    if let Some(degree) = in_degree.get_mut(&dependent.id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            levels.push(current.iter().map(|t| t.id.clone()).collect());
            current = next;
        }

        if placed < self.tasks.len() {
            let placed_ids: HashSet<&TaskId> = levels.iter().flatten().collect();
            let mut rest: Vec<&Task> = self
                .tasks
                .iter()
                .filter(|t| !placed_ids.contains(&t.id))
                .collect();
            sort_for_dispatch(&mut rest);
            levels.push(rest.iter().map(|t| t.id.clone()).collect());
        }
        levels
    }

    /// Markdown rendering of the plan and any results recorded so far.
    pub fn task_report(&self) -> String {
        let mut md = String::from("# Task Execution Plan\n\n");
        for (i, task) in self.tasks.iter().enumerate() {
            md.push_str(&format!("## Task {}: {}\n\n", i + 1, task.description));
            md.push_str(&format!("- **ID**: `{}`\n", task.id));
            md.push_str(&format!("- **Priority**: {}\n", task.priority));
            md.push_str(&format!("- **Status**: {}\n", task.status));
            if let Some(worker) = &task.assigned_worker {
                md.push_str(&format!("- **Worker**: {worker}\n"));
            }
            if task.dependencies.is_empty() {
                md.push_str("- **Dependencies**: None\n");
            } else {
                let deps: Vec<String> =
                    task.dependencies.iter().map(|d| format!("`{d}`")).collect();
                md.push_str(&format!("- **Dependencies**: {}\n", deps.join(", ")));
            }
            md.push_str("\n### Operations\n\n");
            for (j, op) in task.operations.iter().enumerate() {
                md.push_str(&format!("{}. {op}\n", j + 1));
            }
            md.push('\n');
            if let Some(result) = &task.result {
                md.push_str("### Result\n\n");
                match result {
                    TaskResult::Succeeded { payload, is_empty } => {
                        if *is_empty {
                            md.push_str("_Nothing found._\n");
                        }
                        match payload {
                            serde_json::Value::String(text) => {
                                md.push_str(text);
                                md.push('\n');
                            }
                            serde_json::Value::Null => {}
                            other => {
                                let pretty = serde_json::to_string_pretty(other)
                                    .unwrap_or_else(|_| other.to_string());
                                md.push_str(&format!("```json\n{pretty}\n```\n"));
                            }
                        }
                    }
                    TaskResult::Failed { failure } => {
                        md.push_str(&format!("**Failed**: {failure}\n"));
                    }
                    TaskResult::Skipped { reason } => {
                        md.push_str(&format!("**Skipped**: {reason}\n"));
                    }
                }
                md.push('\n');
            }
        }
        md
    }

    /// ASCII tree rooted at tasks without dependencies. Tasks that cannot be
    /// reached from a root are listed separately.
    pub fn dependency_tree(&self) -> String {
        let mut lines = vec!["Task Dependency Graph:".to_string()];
        let mut shown: HashSet<TaskId> = HashSet::new();
        let roots: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.dependencies.is_empty())
            .collect();

        // (task, prefix, is_last, depth); children pushed in reverse so the
        // first child is rendered next.
        let mut stack: Vec<(&Task, String, bool, usize)> = roots
            .iter()
            .enumerate()
            .rev()
            .map(|(i, root)| (*root, String::new(), i + 1 == roots.len(), 0))
            .collect();
        let mut ancestors: Vec<&TaskId> = Vec::new();
        while let Some((task, prefix, is_last, depth)) = stack.pop() {
            ancestors.truncate(depth);
            let branch = if is_last { "└─ " } else { "├─ " };
            lines.push(format!("{prefix}{branch}{} ({})", task.description, task.id));
            shown.insert(task.id.clone());
            ancestors.push(&task.id);

            let child_prefix = format!("{prefix}{}", if is_last { "   " } else { "│  " });
            let children: Vec<&Task> = self
                .tasks
                .iter()
                .filter(|t| t.dependencies.contains(&task.id) && !ancestors.contains(&&t.id))
                .collect();
            for (i, child) in children.iter().enumerate().rev() {
                stack.push((
                    *child,
                    child_prefix.clone(),
                    i + 1 == children.len(),
                    depth + 1,
                ));
            }
        }

        let orphans: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| !shown.contains(&t.id))
            .collect();
        if !orphans.is_empty() {
            lines.push(String::new());
            lines.push("Orphan tasks (unreachable from a root, possible cycle):".to_string());
            for task in orphans {
                lines.push(format!("  ! {} ({})", task.description, task.id));
            }
        }
        lines.join("\n")
    }
}

/// Higher priority first, then ascending id.
fn sort_for_dispatch(tasks: &mut [&Task]) {
    tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
}
