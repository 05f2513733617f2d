//! Engine error types
//!
//! Unified error handling for the orchestration engine.

use thiserror::Error;

/// Engine operation result type.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A tool name could not be resolved in the registry.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed allow-list or schema validation.
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },

    /// A tool invocation raised an error.
    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    /// A tool invocation exceeded its per-call deadline.
    #[error("timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Execution was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// The step-dependency subgraph contains a cycle.
    #[error("Plan dependency graph contains a cycle")]
    CyclicPlan,

    /// A node, step index, or edge endpoint does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// A dependency index named in `after` has not been defined.
    #[error("Unresolved dependency: {0}")]
    UnresolvedDependency(String),

    /// The LLM produced no tool calls after exhausting re-prompts.
    #[error("No tool calls produced after {attempts} attempt(s)")]
    NoToolCalls { attempts: u32 },

    /// A session id could not be resolved in the store.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The underlying store backend failed.
    #[error("Store failure: {0}")]
    StoreFailure(String),

    /// The LLM client failed.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a tool execution failure.
    pub fn tool_execution_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecutionFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an argument-validation failure.
    pub fn invalid_args(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            seconds: duration.as_secs(),
        }
    }

    /// Returns `true` when the retry loop may attempt the call again.
    ///
    /// Timeouts and tool-raised errors are retriable; everything else
    /// (unknown tool, cancellation, store failures) is terminal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ToolExecutionFailed { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::UnknownTool("echo".to_string());
        assert_eq!(err.to_string(), "Unknown tool: echo");

        let err = EngineError::timeout(std::time::Duration::from_secs(30));
        assert_eq!(err.to_string(), "timeout after 30s");
    }

    #[test]
    fn test_retriable_classification() {
        assert!(EngineError::Timeout { seconds: 5 }.is_retriable());
        assert!(EngineError::tool_execution_failed("flaky", "boom").is_retriable());
        assert!(!EngineError::UnknownTool("x".into()).is_retriable());
        assert!(!EngineError::Cancelled.is_retriable());
    }
}
