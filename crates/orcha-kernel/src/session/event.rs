//! Session events
//!
//! Events are the append-only audit trail of a session. They are immutable
//! after append; hierarchical structure lives in `metadata.parent_event_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    Llm,
    System,
}

/// What kind of record an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Summary,
    ToolCall,
}

/// Token accounting attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Estimate usage from raw prompt/completion text.
    pub fn from_texts(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = estimate_tokens(prompt);
        let completion_tokens = estimate_tokens(completion);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Merge another usage record into this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Deterministic token estimator: roughly four characters per token.
///
/// A real tokenizer may be substituted; everything in the engine only relies
/// on the estimate being deterministic and monotone in text length.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    if chars == 0 { 0 } else { chars.div_ceil(4) }
}

/// An event in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Unique event id.
    pub id: String,

    /// Creation timestamp, UTC.
    pub timestamp: DateTime<Utc>,

    /// Record kind.
    #[serde(rename = "type")]
    pub kind: EventType,

    /// Producer of the record.
    pub source: EventSource,

    /// Opaque payload.
    pub message: Value,

    /// Free-form metadata. `parent_event_id` encodes the in-session tree.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Optional link to a [`SessionRun`](super::SessionRun).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Optional token accounting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl SessionEvent {
    /// Create an event with a fresh id and the current timestamp.
    pub fn new(message: Value, kind: EventType, source: EventSource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            source,
            message,
            metadata: Map::new(),
            task_id: None,
            token_usage: None,
        }
    }

    /// Convenience constructor for a user message.
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::new(
            Value::String(text.into()),
            EventType::Message,
            EventSource::User,
        )
    }

    /// Convenience constructor for a system summary.
    pub fn summary(message: Value) -> Self {
        Self::new(message, EventType::Summary, EventSource::System)
    }

    /// Set a metadata key (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Link this event under a parent event.
    pub fn with_parent(self, parent_event_id: impl Into<String>) -> Self {
        self.with_metadata("parent_event_id", Value::String(parent_event_id.into()))
    }

    /// Link this event to a run.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attach estimated token usage for a prompt/completion pair.
    pub fn with_tokens(mut self, prompt: &str, completion: &str) -> Self {
        self.token_usage = Some(TokenUsage::from_texts(prompt, completion));
        self
    }

    /// Parent event id, when this event is part of an in-session tree.
    pub fn parent_event_id(&self) -> Option<&str> {
        self.metadata.get("parent_event_id").and_then(Value::as_str)
    }
}
