//! LLM message types and the client callback contract.

mod client;
mod types;

pub use client::LlmClient;
pub use types::{ChatMessage, FunctionCall, Role, ToolCallRequest, Usage};
