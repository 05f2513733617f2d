//! Plan executor
//!
//! Turns a persisted plan into dependency-ordered batches and runs them:
//! steps within a batch execute concurrently up to a semaphore-bounded
//! limit, batches execute strictly sequentially. Every step leaves a
//! `SUMMARY` started/completed pair in the session, with tool-call events
//! nested under the started event.
//!
//! `run` is safe to call repeatedly on the same plan: tool calls whose
//! outcome is already recorded on their `TOOL_CALL` node are skipped, so a
//! re-entry only executes work added (or invalidated) since the last run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::graph::{EdgeFilter, EdgeKind, GraphEdge, GraphNode, GraphStore, NodeKind};
use orcha_kernel::llm::ToolCallRequest;
use orcha_kernel::session::{EventType, RunStatus, SessionEvent, SessionRun};

use crate::processor::{SessionAwareToolProcessor, ToolExecution};
use crate::store::SessionWriter;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum steps running concurrently within a batch.
    pub max_parallel_steps: usize,
    /// Keep executing later batches after a batch with failed tool calls.
    pub continue_on_failure: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: 3,
            continue_on_failure: true,
        }
    }
}

impl ExecutorConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-batch concurrency limit.
    pub fn with_max_parallel_steps(mut self, max: usize) -> Self {
        self.max_parallel_steps = max.max(1);
        self
    }

    /// Set whether later batches run after a partial failure.
    pub fn with_continue_on_failure(mut self, cont: bool) -> Self {
        self.continue_on_failure = cont;
        self
    }
}

/// Dependency-ordered plan execution over a graph store.
pub struct PlanExecutor {
    graph: Arc<dyn GraphStore>,
    writer: Arc<SessionWriter>,
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl PlanExecutor {
    /// Create an executor bound to a graph and a session writer.
    pub fn new(
        graph: Arc<dyn GraphStore>,
        writer: Arc<SessionWriter>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            graph,
            writer,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// All `PLAN_STEP` children of a plan, sorted by hierarchical index.
    pub fn plan_steps(&self, plan_id: &str) -> EngineResult<Vec<GraphNode>> {
        if self.graph.get_node(plan_id).is_none() {
            return Err(EngineError::InvalidReference(format!(
                "plan {plan_id} does not exist"
            )));
        }
        let edges = self
            .graph
            .get_edges(&EdgeFilter::from(plan_id).of_kind(EdgeKind::ParentChild));
        let mut steps: Vec<GraphNode> = edges
            .iter()
            .filter_map(|e| self.graph.get_node(&e.dst))
            .filter(|n| n.kind == NodeKind::PlanStep)
            .collect();
        steps.sort_by(|a, b| compare_indices(a.index().unwrap_or(""), b.index().unwrap_or("")));
        Ok(steps)
    }

    /// Compute the execution schedule: an ordered list of batches, each a
    /// set of step ids runnable in parallel.
    ///
    /// Kahn's algorithm over `STEP_ORDER` edges; ties within a batch break
    /// by hierarchical index. A cyclic dependency subgraph fails with
    /// `CyclicPlan` (this implementation reports the cycle rather than
    /// falling back to an arbitrary first step) before any events are
    /// emitted.
    pub fn execution_schedule(&self, plan_id: &str) -> EngineResult<Vec<Vec<String>>> {
        let steps = self.plan_steps(plan_id)?;
        let step_ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        let order: HashMap<&str, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        // STEP_ORDER(src -> dst): dst is blocked on src.
        let mut dependencies: HashMap<&str, HashSet<String>> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<String>> = HashMap::new();
        for step in &steps {
            dependencies.entry(step.id.as_str()).or_default();
            dependents.entry(step.id.as_str()).or_default();
        }
        for step in &steps {
            let outgoing = self
                .graph
                .get_edges(&EdgeFilter::from(step.id.clone()).of_kind(EdgeKind::StepOrder));
            for edge in outgoing {
                if !step_ids.contains(edge.dst.as_str()) {
                    continue;
                }
                let dst = steps
                    .iter()
                    .find(|s| s.id == edge.dst)
                    .map(|s| s.id.as_str())
                    .unwrap_or_default();
                dependencies
                    .get_mut(dst)
                    .map(|deps| deps.insert(step.id.clone()));
                dependents
                    .get_mut(step.id.as_str())
                    .map(|deps| deps.push(edge.dst.clone()));
            }
        }

        let mut ready: Vec<String> = steps
            .iter()
            .filter(|s| dependencies[s.id.as_str()].is_empty())
            .map(|s| s.id.clone())
            .collect();

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut scheduled = 0usize;
        while !ready.is_empty() {
            ready.sort_by_key(|id| order.get(id.as_str()).copied().unwrap_or(usize::MAX));
            scheduled += ready.len();

            let mut next: Vec<String> = Vec::new();
            for id in &ready {
                for dependent in dependents.get(id.as_str()).cloned().unwrap_or_default() {
                    if let Some(deps) = dependencies.get_mut(dependent.as_str()) {
                        // A node enters `next` exactly once: only the removal
                        // that empties its set qualifies, guarding against
                        // duplicate STEP_ORDER edges between the same pair.
                        if deps.remove(id) && deps.is_empty() {
                            next.push(dependent);
                        }
                    }
                }
            }
            batches.push(std::mem::take(&mut ready));
            ready = next;
        }

        if scheduled != steps.len() {
            return Err(EngineError::CyclicPlan);
        }
        Ok(batches)
    }

    /// Execute a plan to completion and return every tool execution.
    pub async fn run(
        &self,
        plan_id: &str,
        processor: Arc<SessionAwareToolProcessor>,
    ) -> EngineResult<Vec<ToolExecution>> {
        self.run_inner(plan_id, processor, None).await
    }

    /// Execute at most the first `max_batches` batches, then stop. Used by
    /// the orchestrator to inspect early results before re-planning.
    pub async fn run_partial(
        &self,
        plan_id: &str,
        processor: Arc<SessionAwareToolProcessor>,
        max_batches: usize,
    ) -> EngineResult<Vec<ToolExecution>> {
        self.run_inner(plan_id, processor, Some(max_batches)).await
    }

    async fn run_inner(
        &self,
        plan_id: &str,
        processor: Arc<SessionAwareToolProcessor>,
        max_batches: Option<usize>,
    ) -> EngineResult<Vec<ToolExecution>> {
        // Track this execution as a run in the session.
        let mut run = SessionRun::new();
        run.mark_running();
        let run_id = run.id.clone();
        self.writer
            .mutate(move |session| session.runs.push(run))
            .await?;

        let root_event = SessionEvent::summary(json!({ "plan_id": plan_id }))
            .with_metadata("description", json!("Plan execution started"))
            .with_task(run_id.clone());
        let root_id = self.writer.append_event(root_event).await?;

        let schedule = match self.execution_schedule(plan_id) {
            Ok(schedule) => schedule,
            Err(err) => {
                self.finish_run(&run_id, |run| run.mark_failed(err.to_string()))
                    .await?;
                let event = SessionEvent::summary(json!({
                    "plan_id": plan_id,
                    "error": err.to_string(),
                }))
                .with_parent(&root_id)
                .with_metadata("failed", json!(true));
                self.writer.append_event(event).await?;
                return Err(err);
            }
        };

        let mut executions: Vec<ToolExecution> = Vec::new();
        let mut steps_executed = 0usize;
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_steps));

        let batch_limit = max_batches.unwrap_or(schedule.len());
        for (batch_no, batch) in schedule.iter().take(batch_limit).enumerate() {
            if self.cancel.is_cancelled() {
                self.finish_run(&run_id, |run| run.mark_cancelled()).await?;
                return Err(EngineError::Cancelled);
            }
            debug!(batch = batch_no, steps = batch.len(), "executing batch");

            let mut join_set: JoinSet<(String, EngineResult<Vec<ToolExecution>>)> = JoinSet::new();
            for step_id in batch.clone() {
                let graph = Arc::clone(&self.graph);
                let writer = Arc::clone(&self.writer);
                let processor = Arc::clone(&processor);
                let semaphore = Arc::clone(&semaphore);
                let root_id = root_id.clone();
                join_set.spawn(async move {
                    // The semaphore is never closed; acquisition only fails then.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result =
                        execute_step(graph, writer, processor, &step_id, &root_id).await;
                    (step_id, result)
                });
            }

            let mut batch_failed = false;
            let mut fatal: Option<EngineError> = None;
            while let Some(joined) = join_set.join_next().await {
                let (step_id, result) = joined
                    .map_err(|err| EngineError::Internal(format!("step task panicked: {err}")))?;
                match result {
                    Ok(step_executions) => {
                        steps_executed += 1;
                        if step_executions.iter().any(|e| !e.is_success()) {
                            batch_failed = true;
                        }
                        executions.extend(step_executions);
                    }
                    Err(err) => {
                        warn!(step_id = %step_id, error = %err, "step execution aborted");
                        // Siblings keep running; the batch barrier still holds.
                        fatal = Some(err);
                    }
                }
            }

            if let Some(err) = fatal {
                if matches!(err, EngineError::Cancelled) {
                    self.finish_run(&run_id, |run| run.mark_cancelled()).await?;
                } else {
                    self.finish_run(&run_id, |run| run.mark_failed(err.to_string()))
                        .await?;
                }
                return Err(err);
            }

            if batch_failed && !self.config.continue_on_failure {
                warn!(batch = batch_no, "stopping after failed batch");
                break;
            }
        }

        let all_failed = !executions.is_empty() && executions.iter().all(|e| !e.is_success());
        if all_failed {
            self.finish_run(&run_id, |run| run.mark_failed("all tool calls failed"))
                .await?;
            let event = SessionEvent::summary(json!({
                "plan_id": plan_id,
                "error": "all tool calls failed",
            }))
            .with_parent(&root_id)
            .with_metadata("failed", json!(true));
            self.writer.append_event(event).await?;
        } else {
            self.finish_run(&run_id, |run| run.mark_completed()).await?;
        }

        let summary = SessionEvent::summary(json!({
            "plan_id": plan_id,
            "steps_executed": steps_executed,
            "tools_executed": executions.len(),
        }))
        .with_parent(&root_id);
        self.writer.append_event(summary).await?;

        Ok(executions)
    }

    async fn finish_run<F>(&self, run_id: &str, f: F) -> EngineResult<()>
    where
        F: FnOnce(&mut SessionRun) + Send,
    {
        let run_id = run_id.to_string();
        self.writer
            .mutate(move |session| {
                if let Some(run) = session.runs.iter_mut().find(|r| r.id == run_id) {
                    f(run);
                }
            })
            .await
    }
}

/// Execute one plan step: emit the started summary, dispatch each linked
/// tool call through the processor, write outcomes back onto the
/// `TOOL_CALL` nodes, and emit the completed summary.
async fn execute_step(
    graph: Arc<dyn GraphStore>,
    writer: Arc<SessionWriter>,
    processor: Arc<SessionAwareToolProcessor>,
    step_id: &str,
    plan_root_event_id: &str,
) -> EngineResult<Vec<ToolExecution>> {
    let step = graph
        .get_node(step_id)
        .filter(|n| n.kind == NodeKind::PlanStep)
        .ok_or_else(|| EngineError::InvalidReference(format!("invalid plan step: {step_id}")))?;

    let started = SessionEvent::summary(json!({
        "step_id": step_id,
        "description": step.description().unwrap_or("Unknown step"),
        "status": "started",
    }))
    .with_parent(plan_root_event_id);
    let step_event_id = writer.append_event(started).await?;

    let mut executions = Vec::new();
    let tool_edges = graph.get_edges(&EdgeFilter::from(step_id).of_kind(EdgeKind::PlanLink));
    for edge in tool_edges {
        let Some(tool_node) = graph.get_node(&edge.dst) else {
            continue;
        };
        if tool_node.kind != NodeKind::ToolCall {
            continue;
        }
        if tool_node.has_outcome() {
            debug!(node = %tool_node.id, "skipping tool call with recorded outcome");
            continue;
        }

        let name = tool_node.tool_name().unwrap_or_default().to_string();
        let args = tool_node.get("args").cloned().unwrap_or(json!({}));
        let call = ToolCallRequest::function(tool_node.id.clone(), name, args.to_string());

        let execution = processor.process_tool_call(&call, &step_event_id).await?;

        // The graph is authoritative for tool-call outcomes.
        graph.update_node(tool_node.with_outcome(
            Some(execution.result.clone()),
            execution.error.as_deref(),
            execution.cached,
        ))?;
        let task_run = GraphNode::task_run(
            execution.is_success(),
            execution.error.as_deref(),
            Utc::now().to_rfc3339(),
        );
        let task_run_id = task_run.id.clone();
        graph.add_node(task_run)?;
        graph.add_edge(GraphEdge::parent_child(tool_node.id.clone(), task_run_id))?;

        executions.push(execution);
    }

    let completed = SessionEvent::summary(json!({
        "step_id": step_id,
        "status": "completed",
        "tools_executed": executions.len(),
    }))
    .with_parent(plan_root_event_id);
    writer.append_event(completed).await?;

    Ok(executions)
}

/// Compare hierarchical indices segment-wise and numerically, so that
/// "1.2" < "1.10" and "2" < "10".
fn compare_indices(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|seg| seg.parse::<u64>().unwrap_or(u64::MAX))
            .collect()
    };
    parse(a).cmp(&parse(b))
}
