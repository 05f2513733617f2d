//! In-memory tool registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use orcha_kernel::tool::{Tool, ToolRegistry};

/// Thread-safe in-memory [`ToolRegistry`].
///
/// # Example
///
/// ```rust,ignore
/// use orcha_foundation::InMemoryToolRegistry;
///
/// let registry = InMemoryToolRegistry::new();
/// registry.register(Arc::new(FnTool::new("echo", |args| async move {
///     Ok(serde_json::json!({ "echo": args }))
/// })));
/// assert!(registry.contains("echo"));
/// ```
#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl InMemoryToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with tools.
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Create a shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn count(&self) -> usize {
        self.tools.read().len()
    }
}
