//! Orchestrator loop
//!
//! Drives a user goal end to end: ask the planner LLM for a JSON plan,
//! validate it against the tool allow-list, persist it as graph nodes,
//! execute the first batch, ask the LLM for follow-up sub-plans where fresh
//! data warrants them, finish execution (the executor only runs steps whose
//! outputs are absent), and produce a one-sentence summary.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::graph::{GraphEdge, GraphNode, GraphStore};
use orcha_kernel::llm::{ChatMessage, LlmClient};
use orcha_kernel::plan::PlanBuilder;
use orcha_kernel::session::{EventSource, EventType, Session, SessionEvent, SessionStore};
use orcha_kernel::tool::ToolRegistry;

use crate::executor::{ExecutorConfig, PlanExecutor};
use crate::plan_spec::{PlanSpec, ToolAllowList, parse_plan_json};
use crate::processor::{ProcessorConfig, SessionAwareToolProcessor, ToolExecution};
use crate::store::SessionWriter;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Tools whose results may warrant follow-up sub-planning.
    pub followup_tools: Vec<String>,
    /// Maximum number of follow-up sub-plans per run.
    pub max_followups: usize,
    /// Result snippet budget (characters) for follow-up prompts.
    pub snippet_chars: usize,
    /// Override for the planner system prompt.
    pub planner_system_prompt: Option<String>,
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Processor settings.
    pub processor: ProcessorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            followup_tools: vec!["search".to_string()],
            max_followups: 3,
            snippet_chars: 2000,
            planner_system_prompt: None,
            executor: ExecutorConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }
}

/// Result of one orchestrated goal.
#[derive(Debug)]
pub struct OrchestratorOutcome {
    pub session_id: String,
    pub plan_id: String,
    pub outline: String,
    pub executions: Vec<ToolExecution>,
    pub summary: String,
}

/// Goal → plan → execute → re-plan → summarize.
pub struct Orchestrator {
    graph: Arc<dyn GraphStore>,
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    allow: ToolAllowList,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator over explicit collaborators.
    pub fn new(
        graph: Arc<dyn GraphStore>,
        store: Arc<dyn SessionStore>,
        registry: Arc<dyn ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        allow: ToolAllowList,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            graph,
            store,
            registry,
            llm,
            allow,
            config,
        }
    }

    /// Run a user goal to completion.
    pub async fn run(&self, goal: &str) -> EngineResult<OrchestratorOutcome> {
        let session = Session::new();
        let session_id = session.id.clone();
        self.store.save(&session).await?;
        let writer = Arc::new(SessionWriter::new(self.store.clone(), session_id.clone()));

        writer
            .append_event(SessionEvent::user_message(goal))
            .await?;

        // Plan.
        let spec = self.request_plan(goal).await?;
        info!(title = %spec.title, steps = spec.steps.len(), "planner produced a plan");

        let mut builder = PlanBuilder::new(&spec.title);
        for step in &spec.steps {
            let deps: Vec<String> = step.depends_on.iter().map(|d| d.as_index()).collect();
            let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
            builder.step_after(&step.title, &dep_refs).up();
        }
        let plan_id = builder.save(self.graph.as_ref())?;

        writer
            .append_event(
                SessionEvent::new(
                    serde_json::to_value(&spec)?,
                    EventType::Message,
                    EventSource::Llm,
                )
                .with_metadata("plan_id", json!(plan_id))
                .with_tokens(goal, &serde_json::to_string(&spec)?),
            )
            .await?;

        // Enrich steps with their tool-call nodes.
        let mut call_step_index: HashMap<String, String> = HashMap::new();
        for (i, step) in spec.steps.iter().enumerate() {
            let index = (i + 1).to_string();
            let node_id = self.attach_tool_call(&builder, &index, &step.tool, &step.args)?;
            call_step_index.insert(node_id, index);
        }

        let processor = Arc::new(SessionAwareToolProcessor::new(
            writer.clone(),
            self.registry.clone(),
            self.config.processor.clone(),
        ));
        let executor = PlanExecutor::new(
            self.graph.clone(),
            writer.clone(),
            self.config.executor.clone(),
        );

        // Execute the first batch, then look at the evidence.
        let first = executor
            .run_partial(&plan_id, processor.clone(), 1)
            .await?;

        let mut followups = 0usize;
        for execution in &first {
            if followups >= self.config.max_followups {
                break;
            }
            if !self.config.followup_tools.contains(&execution.tool)
                || !execution.is_success()
                || execution.result.is_null()
            {
                continue;
            }
            let Some(parent_index) = call_step_index.get(&execution.call_id).cloned() else {
                continue;
            };
            if let Some(sub) = self.request_followup(goal, &execution.result).await? {
                info!(parent = %parent_index, steps = sub.steps.len(), "attaching follow-up sub-plan");
                self.attach_subplan(&mut builder, &parent_index, &sub)?;
                followups += 1;
            }
        }

        // Finish the plan; already-recorded outcomes are skipped.
        let rest = executor.run(&plan_id, processor).await?;
        let mut executions = first;
        executions.extend(rest);

        let summary = self.summarize(goal, &executions).await?;
        writer
            .append_event(
                SessionEvent::new(json!(summary), EventType::Summary, EventSource::Llm)
                    .with_tokens(goal, &summary),
            )
            .await?;

        Ok(OrchestratorOutcome {
            session_id,
            plan_id,
            outline: builder.outline(),
            executions,
            summary,
        })
    }

    /// Ask the planner for the initial plan and validate it.
    async fn request_plan(&self, goal: &str) -> EngineResult<PlanSpec> {
        let response = self
            .llm
            .complete(vec![
                ChatMessage::system(self.planner_prompt()),
                ChatMessage::user(goal),
            ])
            .await?;
        let content = response
            .text_content()
            .ok_or_else(|| EngineError::Llm("planner returned no content".to_string()))?;
        let spec = parse_plan_json(content)?;
        self.allow.validate(&spec)?;
        Ok(spec)
    }

    /// Ask the LLM whether fresh data warrants more steps. `None` when the
    /// model answers DONE, or when its sub-plan fails parsing/validation
    /// (a malformed follow-up is dropped, not fatal).
    async fn request_followup(&self, goal: &str, data: &Value) -> EngineResult<Option<PlanSpec>> {
        let snippet = snippet_of(data, self.config.snippet_chars);
        let prompt = format!(
            "User goal: {goal:?}\n\nNew data:\n{snippet}\n\n\
             If more tool calls help, return a JSON plan (same schema). Else reply with DONE."
        );
        let response = self
            .llm
            .complete(vec![
                ChatMessage::system(self.planner_prompt()),
                ChatMessage::user(prompt),
            ])
            .await?;
        let Some(content) = response.text_content() else {
            return Ok(None);
        };
        if content.trim().eq_ignore_ascii_case("done") {
            return Ok(None);
        }
        let sub = match parse_plan_json(content) {
            Ok(sub) => sub,
            Err(err) => {
                warn!(error = %err, "discarding unparsable follow-up plan");
                return Ok(None);
            }
        };
        if let Err(err) = self.allow.validate(&sub) {
            warn!(error = %err, "discarding invalid follow-up plan");
            return Ok(None);
        }
        Ok(Some(sub))
    }

    /// Attach sub-plan steps (and their tool calls) under `parent_index`.
    fn attach_subplan(
        &self,
        builder: &mut PlanBuilder,
        parent_index: &str,
        sub: &PlanSpec,
    ) -> EngineResult<()> {
        for step in &sub.steps {
            let child_index =
                builder.add_step(self.graph.as_ref(), &step.title, Some(parent_index), &[])?;
            self.attach_tool_call(builder, &child_index, &step.tool, &step.args)?;
        }
        Ok(())
    }

    /// Create a `TOOL_CALL` node and link it to the step at `index`.
    fn attach_tool_call(
        &self,
        builder: &PlanBuilder,
        index: &str,
        tool: &str,
        args: &serde_json::Map<String, Value>,
    ) -> EngineResult<String> {
        let step_id = builder.step_id(index).ok_or_else(|| {
            EngineError::InvalidReference(format!("no step at index {index}"))
        })?;
        let node = GraphNode::tool_call(tool, Value::Object(args.clone()));
        let node_id = node.id.clone();
        self.graph.add_node(node)?;
        self.graph
            .add_edge(GraphEdge::plan_link(step_id, node_id.clone()))?;
        Ok(node_id)
    }

    /// Produce the one-sentence summary. When every tool failed, the summary
    /// states so directly instead of consulting the LLM.
    async fn summarize(&self, goal: &str, executions: &[ToolExecution]) -> EngineResult<String> {
        if !executions.is_empty() && executions.iter().all(|e| !e.is_success()) {
            let first_error = executions
                .iter()
                .filter_map(|e| e.error.as_deref())
                .next()
                .unwrap_or("unknown error");
            return Ok(format!(
                "All tool calls failed; no results were collected (first error: {first_error})."
            ));
        }

        let results: Vec<Value> = executions
            .iter()
            .map(|e| {
                json!({
                    "tool": e.tool,
                    "result": e.result,
                    "error": e.error,
                })
            })
            .collect();
        let prompt = format!(
            "Task: {goal}\nTool results JSON:\n{}\nReply in one sentence.",
            serde_json::to_string_pretty(&results)?
        );
        let response = self.llm.complete(vec![ChatMessage::user(prompt)]).await?;
        Ok(response
            .text_content()
            .unwrap_or("No summary produced.")
            .trim()
            .to_string())
    }

    fn planner_prompt(&self) -> String {
        if let Some(prompt) = &self.config.planner_system_prompt {
            return prompt.clone();
        }
        format!(
            "You are an assistant that writes a JSON *plan* using only these tools:\n\
             {}\n\
             Return ONLY a JSON object of the form\n\
             {{\n  \"title\": str,\n  \"steps\": [ {{ \"title\": str, \"tool\": str, \
             \"args\": object, \"depends_on\": [] }} ]\n}}",
            self.allow.signature_lines()
        )
    }
}

/// Pretty-print a value, truncated to a character budget.
fn snippet_of(data: &Value, max_chars: usize) -> String {
    let rendered = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    if rendered.chars().count() <= max_chars {
        return rendered;
    }
    let truncated: String = rendered.chars().take(max_chars).collect();
    debug!(max_chars, "truncated follow-up snippet");
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snippet_truncates() {
        let data = json!({"items": vec!["aaaaaaaaaa"; 50]});
        let snippet = snippet_of(&data, 40);
        assert!(snippet.chars().count() <= 41);
        assert!(snippet.ends_with('…'));

        let short = snippet_of(&json!({"a": 1}), 1000);
        assert!(!short.ends_with('…'));
    }
}
