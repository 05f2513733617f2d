//! Session-aware tool processor
//!
//! Executes tool-call requests with caching, retry, timeout, and
//! cancellation, and records every step as a hierarchical event trail in the
//! session:
//!
//! ```text
//! MESSAGE (batch root, source=llm, contains_tool_calls=true)
//! ├── SUMMARY  (retry notice, optional, repeatable)
//! ├── TOOL_CALL (attempt=1)
//! ├── TOOL_CALL (attempt=2, after retry)
//! └── TOOL_CALL (cached=true, when served from cache)
//! ```
//!
//! Tool-level failures are recoverable: the retry loop consumes them and the
//! call resolves to a [`ToolExecution`] with `error` set rather than an
//! `Err`. Only cancellation and store failures propagate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::llm::{ChatMessage, LlmClient, ToolCallRequest};
use orcha_kernel::session::{EventSource, EventType, SessionEvent, SessionRun};
use orcha_kernel::tool::ToolRegistry;

use crate::store::SessionWriter;

/// Default instruction sent to the LLM when a response that should contain
/// tool calls does not.
pub const DEFAULT_LLM_RETRY_PROMPT: &str = "Previous response contained no valid tool_call.\n\
     Return ONLY a JSON block invoking one of the declared tools.";

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Cache tool results for identical `(tool, args)` pairs.
    pub enable_caching: bool,
    /// Retry failed tool calls.
    pub enable_retries: bool,
    /// Maximum retries per tool call (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Per-call execution deadline. A timeout counts as a retriable failure.
    pub tool_timeout: Duration,
    /// Maximum LLM re-prompts when an assistant message lacks tool calls.
    pub max_llm_retries: u32,
    /// Instruction used for LLM re-prompts.
    pub llm_retry_prompt: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enable_caching: true,
            enable_retries: true,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            tool_timeout: Duration::from_secs(30),
            max_llm_retries: 2,
            llm_retry_prompt: DEFAULT_LLM_RETRY_PROMPT.to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle result caching.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Toggle retries.
    pub fn with_retries(mut self, enabled: bool) -> Self {
        self.enable_retries = enabled;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-call timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the LLM re-prompt budget.
    pub fn with_max_llm_retries(mut self, max: u32) -> Self {
        self.max_llm_retries = max;
        self
    }
}

/// Outcome of one tool-call request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    /// Tool name.
    pub tool: String,
    /// Id of the originating call (graph node id on the plan path).
    pub call_id: String,
    /// Parsed arguments.
    pub args: Value,
    /// Tool result; `null` on failure or when the tool returned nothing.
    pub result: Value,
    /// Error message when the call ultimately failed.
    pub error: Option<String>,
    /// Served from the result cache.
    pub cached: bool,
    /// Attempts consumed (0 for cache hits).
    pub attempts: u32,
}

impl ToolExecution {
    /// Returns `true` when the call produced a result.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

enum Attempt {
    Success(Value),
    /// Retriable failure.
    Failed(String),
    /// Non-retriable failure (unknown tool).
    Fatal(String),
}

/// Tool processor that logs all execution into a session.
pub struct SessionAwareToolProcessor {
    writer: Arc<SessionWriter>,
    registry: Arc<dyn ToolRegistry>,
    config: ProcessorConfig,
    cache: Mutex<HashMap<String, Value>>,
    cancel: CancellationToken,
}

impl SessionAwareToolProcessor {
    /// Create a processor bound to one session.
    pub fn new(
        writer: Arc<SessionWriter>,
        registry: Arc<dyn ToolRegistry>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            writer,
            registry,
            config,
            cache: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation token observed by in-flight calls.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The session writer this processor appends through.
    pub fn writer(&self) -> &Arc<SessionWriter> {
        &self.writer
    }

    /// Number of cached results.
    pub async fn cache_size(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Process a single tool-call request, appending child events under
    /// `parent_event_id`.
    ///
    /// Tool failures (including timeouts) are consumed by the retry loop and
    /// surface in the returned record's `error`; the call itself only fails
    /// on cancellation or a store error.
    pub async fn process_tool_call(
        &self,
        call: &ToolCallRequest,
        parent_event_id: &str,
    ) -> EngineResult<ToolExecution> {
        let tool_name = call.function.name.clone();
        let call_id = call.id.clone();
        let args = parse_args(&call.function.arguments);

        // Cache probe.
        let cache_key = self
            .config
            .enable_caching
            .then(|| cache_key(&tool_name, &args));
        if let Some(key) = &cache_key {
            let hit = self.cache.lock().await.get(key).cloned();
            if let Some(result) = hit {
                debug!(tool = %tool_name, "cache hit");
                let event = self
                    .tool_call_event(&tool_name, &args, &result, None, true)
                    .with_parent(parent_event_id)
                    .with_metadata("call_id", json!(call_id))
                    .with_metadata("cached", json!(true));
                self.writer.append_event(event).await?;
                return Ok(ToolExecution {
                    tool: tool_name,
                    call_id,
                    args,
                    result,
                    error: None,
                    cached: true,
                    attempts: 0,
                });
            }
        }

        // Execute with retry.
        let max_attempts = if self.config.enable_retries {
            self.config.max_retries + 1
        } else {
            1
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            if self.cancel.is_cancelled() {
                return self
                    .emit_cancelled(&tool_name, &args, &call_id, parent_event_id)
                    .await;
            }

            let outcome = match self.registry.get(&tool_name) {
                None => Attempt::Fatal(EngineError::UnknownTool(tool_name.clone()).to_string()),
                Some(tool) => {
                    if let Err(err) = tool.validate_args(&args) {
                        Attempt::Failed(err.to_string())
                    } else {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                return self
                                    .emit_cancelled(&tool_name, &args, &call_id, parent_event_id)
                                    .await;
                            }
                            invoked = tokio::time::timeout(
                                self.config.tool_timeout,
                                tool.invoke(args.clone()),
                            ) => match invoked {
                                Err(_elapsed) => Attempt::Failed(
                                    EngineError::timeout(self.config.tool_timeout).to_string(),
                                ),
                                Ok(Ok(value)) => Attempt::Success(value),
                                Ok(Err(err)) => Attempt::Failed(err.to_string()),
                            },
                        }
                    }
                }
            };

            match outcome {
                Attempt::Success(result) => {
                    if let Some(key) = &cache_key {
                        self.cache.lock().await.insert(key.clone(), result.clone());
                    }
                    let event = self
                        .tool_call_event(&tool_name, &args, &result, None, false)
                        .with_parent(parent_event_id)
                        .with_metadata("call_id", json!(call_id))
                        .with_metadata("attempt", json!(attempt));
                    self.writer.append_event(event).await?;
                    return Ok(ToolExecution {
                        tool: tool_name,
                        call_id,
                        args,
                        result,
                        error: None,
                        cached: false,
                        attempts: attempt,
                    });
                }
                Attempt::Failed(message) if attempt < max_attempts => {
                    warn!(tool = %tool_name, attempt, error = %message, "tool call failed, retrying");
                    let notice = SessionEvent::summary(json!(format!(
                        "Retry {}/{} for tool {}: {}",
                        attempt, self.config.max_retries, tool_name, message
                    )))
                    .with_parent(parent_event_id)
                    .with_metadata("call_id", json!(call_id))
                    .with_metadata("attempt", json!(attempt))
                    .with_metadata("retry", json!(true));
                    self.writer.append_event(notice).await?;

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return self
                                .emit_cancelled(&tool_name, &args, &call_id, parent_event_id)
                                .await;
                        }
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
                Attempt::Failed(message) | Attempt::Fatal(message) => {
                    warn!(tool = %tool_name, attempt, error = %message, "tool call failed terminally");
                    let event = self
                        .tool_call_event(&tool_name, &args, &Value::Null, Some(&message), false)
                        .with_parent(parent_event_id)
                        .with_metadata("call_id", json!(call_id))
                        .with_metadata("attempt", json!(attempt))
                        .with_metadata("failed", json!(true));
                    self.writer.append_event(event).await?;
                    return Ok(ToolExecution {
                        tool: tool_name,
                        call_id,
                        args,
                        result: Value::Null,
                        error: Some(message),
                        cached: false,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Process an assistant message expected to contain tool calls.
    ///
    /// Appends the batch-root `message` event, executes each call as a child
    /// of it, and re-prompts the LLM up to `max_llm_retries` times when the
    /// message carries no tool calls. Exhaustion fails with `NoToolCalls`.
    pub async fn process_llm_message(
        &self,
        message: &ChatMessage,
        llm: &dyn LlmClient,
    ) -> EngineResult<Vec<ToolExecution>> {
        let mut run = SessionRun::new();
        run.mark_running();
        let run_id = run.id.clone();
        self.writer.mutate(move |session| session.runs.push(run)).await?;

        let serialized = serde_json::to_string(message)?;
        let batch_event = SessionEvent::new(
            serde_json::to_value(message)?,
            EventType::Message,
            EventSource::Llm,
        )
        .with_metadata("contains_tool_calls", json!(message.has_tool_calls()))
        .with_task(run_id.clone())
        .with_tokens("", &serialized);
        let batch_id = self.writer.append_event(batch_event).await?;

        let mut current = message.clone();
        let mut reprompts = 0u32;

        loop {
            if current.has_tool_calls() {
                let calls = current.tool_calls.clone().unwrap_or_default();
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    match self.process_tool_call(call, &batch_id).await {
                        Ok(execution) => results.push(execution),
                        Err(err) => {
                            let cancelled = matches!(err, EngineError::Cancelled);
                            self.finish_run(&run_id, move |run| {
                                if cancelled {
                                    run.mark_cancelled();
                                } else {
                                    run.mark_failed("tool processing aborted");
                                }
                            })
                            .await?;
                            return Err(err);
                        }
                    }
                }
                self.finish_run(&run_id, |run| run.mark_completed()).await?;
                return Ok(results);
            }

            if reprompts >= self.config.max_llm_retries {
                let event = SessionEvent::summary(json!({
                    "error": "no tool calls in assistant response",
                    "attempts": reprompts,
                }))
                .with_parent(&batch_id)
                .with_metadata("failed", json!(true));
                self.writer.append_event(event).await?;
                self.finish_run(&run_id, |run| run.mark_failed("no tool calls")).await?;
                return Err(EngineError::NoToolCalls {
                    attempts: reprompts,
                });
            }

            reprompts += 1;
            debug!(attempt = reprompts, "re-prompting LLM for tool calls");
            let notice = SessionEvent::summary(json!({
                "note": "Retry due to missing tool calls",
                "attempt": reprompts,
            }))
            .with_parent(&batch_id)
            .with_metadata("retry", json!(true));
            self.writer.append_event(notice).await?;

            current = llm
                .complete(vec![ChatMessage::user(self.config.llm_retry_prompt.clone())])
                .await?;
        }
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

    async fn emit_cancelled(
        &self,
        tool_name: &str,
        args: &Value,
        call_id: &str,
        parent_event_id: &str,
    ) -> EngineResult<ToolExecution> {
        let event = self
            .tool_call_event(tool_name, args, &Value::Null, Some("cancelled"), false)
            .with_parent(parent_event_id)
            .with_metadata("call_id", json!(call_id));
        self.writer.append_event(event).await?;
        Err(EngineError::Cancelled)
    }

    fn tool_call_event(
        &self,
        tool_name: &str,
        args: &Value,
        result: &Value,
        error: Option<&str>,
        cached: bool,
    ) -> SessionEvent {
        let mut message = json!({
            "tool": tool_name,
            "arguments": args,
            "result": result,
            "error": error,
        });
        if cached {
            message["cached"] = json!(true);
        }
        let completion = match error {
            Some(err) => err.to_string(),
            None => result.to_string(),
        };
        SessionEvent::new(message, EventType::ToolCall, EventSource::System)
            .with_tokens(&format!("{tool_name}({args})"), &completion)
    }
}

/// Decode serialized tool arguments; undecodable text is preserved under
/// `raw_arguments` rather than dropped.
fn parse_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw_arguments": raw }))
}

/// Cache key: `sha256(tool ‖ canonical_json(args))` with object keys sorted.
fn cache_key(tool_name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(args).as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a JSON value with object keys in sorted order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}
