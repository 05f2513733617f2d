//! LLM client trait
//!
//! The engine treats the LLM as an opaque async callable: a message list in,
//! one assistant message out. Every call site passes a normalized message
//! list, never a bare prompt string.

use async_trait::async_trait;

use super::ChatMessage;
use crate::error::EngineResult;

/// Opaque LLM callback.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce the next assistant message for a conversation.
    async fn complete(&self, messages: Vec<ChatMessage>) -> EngineResult<ChatMessage>;
}
