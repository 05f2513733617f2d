//! Tool interface
//!
//! A single trait covers every tool: `{name, invoke(args) → result}` plus an
//! optional parameter schema and validation hook. Heterogeneous callables are
//! adapted at registration time via [`FnTool`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::error::{EngineError, EngineResult};

/// A named, invocable tool.
///
/// # Example
///
/// ```rust,ignore
/// use orcha_kernel::tool::Tool;
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Echo the arguments back" }
///     async fn invoke(&self, args: serde_json::Value) -> EngineResult<serde_json::Value> {
///         Ok(serde_json::json!({ "echo": args }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human/LLM-facing description.
    fn description(&self) -> &str {
        ""
    }

    /// JSON Schema for the argument object.
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// Validate arguments before invocation. Failures surface as ordinary
    /// tool errors.
    fn validate_args(&self, _args: &Value) -> EngineResult<()> {
        Ok(())
    }

    /// Execute the tool. Any JSON-serializable value may be returned,
    /// including `null`.
    async fn invoke(&self, args: Value) -> EngineResult<Value>;
}

/// Lookup table of tools by name.
pub trait ToolRegistry: Send + Sync {
    /// Register a tool under its own name, replacing any previous entry.
    fn register(&self, tool: Arc<dyn Tool>);

    /// Resolve a tool by name.
    fn get(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Returns `true` when a tool with this name is registered.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered tool names, sorted.
    fn names(&self) -> Vec<String>;

    /// Number of registered tools.
    fn count(&self) -> usize;
}

/// Resolve and invoke a tool through a registry.
///
/// An unresolvable name is `UnknownTool`; validation failures and tool
/// errors propagate unchanged.
pub async fn execute_tool(
    registry: &dyn ToolRegistry,
    name: &str,
    args: Value,
) -> EngineResult<Value> {
    let tool = registry
        .get(name)
        .ok_or_else(|| EngineError::UnknownTool(name.to_string()))?;
    tool.validate_args(&args)?;
    tool.invoke(args).await
}

type FnToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, EngineResult<Value>> + Send + Sync>;

/// Adapter turning an async closure into a [`Tool`].
///
/// ```rust,ignore
/// let echo = FnTool::new("echo", |args| async move {
///     Ok(serde_json::json!({ "echo": args }))
/// });
/// registry.register(std::sync::Arc::new(echo));
/// ```
pub struct FnTool {
    name: String,
    description: String,
    handler: FnToolHandler,
}

impl FnTool {
    /// Wrap an async closure as a tool.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = EngineResult<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            handler: Arc::new(move |args| -> BoxFuture<'static, EngineResult<Value>> {
                Box::pin(handler(args))
            }),
        }
    }

    /// Set the tool description (builder style).
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, args: Value) -> EngineResult<Value> {
        (self.handler)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_tool_invokes_closure() {
        let echo = FnTool::new("echo", |args| async move { Ok(json!({ "echo": args })) })
            .with_description("Echo the arguments back");

        assert_eq!(echo.name(), "echo");
        assert_eq!(echo.description(), "Echo the arguments back");

        let result = echo.invoke(json!({"msg": "hi"})).await.unwrap();
        assert_eq!(result, json!({"echo": {"msg": "hi"}}));
    }

    #[tokio::test]
    async fn fn_tool_propagates_errors() {
        let flaky = FnTool::new("flaky", |_args| async move {
            Err(EngineError::tool_execution_failed("flaky", "boom"))
        });

        let err = flaky.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolExecutionFailed { .. }));
    }
}
