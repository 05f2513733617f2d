//! Prompt builder
//!
//! Rebuilds an LLM prompt from a session's recorded events under a named
//! strategy, with a post-step truncator that enforces a token budget by
//! dropping the oldest non-system messages.

use serde_json::Value;

use orcha_kernel::error::EngineResult;
use orcha_kernel::llm::{ChatMessage, Role};
use orcha_kernel::session::{
    EventSource, EventType, Session, SessionEvent, SessionStore, ancestors, estimate_tokens,
};

/// Named rule for rebuilding a prompt from session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Latest user message, plus the tool results that followed it.
    Minimal,
    /// Every user/assistant message in timestamp order.
    Conversation,
    /// Conversation for the current session, prefixed by a condensed summary
    /// of each ancestor session.
    Hierarchical,
    /// Latest user message followed by every tool call rendered as a
    /// tool-role message.
    ToolFocused,
}

/// Rebuild a prompt from a session under the given strategy.
///
/// The store is consulted only by [`PromptStrategy::Hierarchical`], which
/// walks ancestor sessions; each ancestor contributes its most recent
/// `SUMMARY` event (ancestors without one are skipped).
pub async fn build_prompt(
    session: &Session,
    strategy: PromptStrategy,
    store: &dyn SessionStore,
) -> EngineResult<Vec<ChatMessage>> {
    match strategy {
        PromptStrategy::Minimal => Ok(minimal(session)),
        PromptStrategy::Conversation => Ok(conversation(session)),
        PromptStrategy::Hierarchical => {
            let mut messages = Vec::new();
            let mut lineage = ancestors(store, session).await?;
            // Nearest-first from the walk; the prompt reads root-first.
            lineage.reverse();
            for ancestor in &lineage {
                if let Some(summary) = ancestor.last_event_of(EventType::Summary) {
                    messages.push(ChatMessage::system(format!(
                        "Summary of an earlier conversation: {}",
                        message_text(summary)
                    )));
                }
            }
            messages.extend(conversation(session));
            Ok(messages)
        }
        PromptStrategy::ToolFocused => Ok(tool_focused(session)),
    }
}

fn minimal(session: &Session) -> Vec<ChatMessage> {
    let Some(user_pos) = session
        .events
        .iter()
        .rposition(|e| e.kind == EventType::Message && e.source == EventSource::User)
    else {
        return Vec::new();
    };

    let mut messages = vec![ChatMessage::user(message_text(&session.events[user_pos]))];
    for event in &session.events[user_pos + 1..] {
        if event.kind == EventType::ToolCall {
            messages.push(tool_message(event));
        }
    }
    messages
}

fn conversation(session: &Session) -> Vec<ChatMessage> {
    session
        .events_by_type(EventType::Message)
        .filter_map(|event| match event.source {
            EventSource::User => Some(ChatMessage::user(message_text(event))),
            EventSource::Llm => Some(ChatMessage::assistant(message_text(event))),
            EventSource::System => None,
        })
        .collect()
}

fn tool_focused(session: &Session) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    if let Some(user) = session
        .events
        .iter()
        .rev()
        .find(|e| e.kind == EventType::Message && e.source == EventSource::User)
    {
        messages.push(ChatMessage::user(message_text(user)));
    }
    for event in session.events_by_type(EventType::ToolCall) {
        messages.push(tool_message(event));
    }
    messages
}

fn tool_message(event: &SessionEvent) -> ChatMessage {
    let tool = event
        .message
        .get("tool")
        .and_then(Value::as_str)
        .unwrap_or("tool");
    let call_id = event
        .metadata
        .get("call_id")
        .and_then(Value::as_str)
        .unwrap_or(event.id.as_str());
    let result = event.message.get("result").cloned().unwrap_or(Value::Null);
    ChatMessage::tool_result(call_id, tool, result.to_string())
}

/// Best-effort text rendering of an event payload: a plain string is used
/// as-is, an object's `content` field is preferred, anything else is
/// serialized.
fn message_text(event: &SessionEvent) -> String {
    match &event.message {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("content").and_then(Value::as_str) {
            Some(content) => content.to_string(),
            None => event.message.to_string(),
        },
        other => other.to_string(),
    }
}

/// Drop the oldest non-system messages until the estimated token count fits
/// the budget. System messages are preserved.
pub fn truncate_to_budget(mut messages: Vec<ChatMessage>, max_tokens: u32) -> Vec<ChatMessage> {
    while message_tokens(&messages) > max_tokens {
        let Some(pos) = messages.iter().position(|m| m.role != Role::System) else {
            break;
        };
        messages.remove(pos);
    }
    messages
}

fn message_tokens(messages: &[ChatMessage]) -> u32 {
    messages
        .iter()
        .map(|m| estimate_tokens(m.content.as_deref().unwrap_or("")) + 4)
        .sum()
}
