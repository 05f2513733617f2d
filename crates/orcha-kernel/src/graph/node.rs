//! Graph nodes
//!
//! A node is a tagged record: a `kind` discriminator plus a kind-specific
//! attribute bag. Nodes are immutable after creation; the only sanctioned
//! mutation path is [`GraphStore::update_node`](super::GraphStore), which
//! replaces the attribute bag while preserving id and kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Discriminator for graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Session,
    UserMsg,
    AssistMsg,
    Plan,
    PlanStep,
    ToolCall,
    TaskRun,
    Summary,
}

/// A single node in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node id.
    pub id: String,

    /// Node kind discriminator.
    pub kind: NodeKind,

    /// Kind-specific attributes.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl GraphNode {
    /// Create a node with a fresh id.
    pub fn new(kind: NodeKind, data: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            data,
        }
    }

    /// Create a node with an explicit id.
    pub fn with_id(id: impl Into<String>, kind: NodeKind, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
        }
    }

    /// Create a `PLAN` node.
    pub fn plan(title: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("description".into(), Value::String(title.into()));
        Self::new(NodeKind::Plan, data)
    }

    /// Create a `PLAN_STEP` node carrying its hierarchical index.
    pub fn plan_step(title: impl Into<String>, index: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("description".into(), Value::String(title.into()));
        data.insert("index".into(), Value::String(index.into()));
        Self::new(NodeKind::PlanStep, data)
    }

    /// Create a `TOOL_CALL` node. `result`, `error`, and `cached` are filled
    /// in by the executor once the call has run.
    pub fn tool_call(name: impl Into<String>, args: Value) -> Self {
        let mut data = Map::new();
        data.insert("name".into(), Value::String(name.into()));
        data.insert("args".into(), args);
        Self::new(NodeKind::ToolCall, data)
    }

    /// Create a `TASK_RUN` node recording a single execution outcome.
    pub fn task_run(success: bool, error: Option<&str>, timestamp: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("success".into(), Value::Bool(success));
        data.insert(
            "error".into(),
            error.map(|e| Value::String(e.into())).unwrap_or(Value::Null),
        );
        data.insert("timestamp".into(), Value::String(timestamp.into()));
        Self::new(NodeKind::TaskRun, data)
    }

    /// Create a `USER_MSG` node.
    pub fn user_message(content: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("content".into(), Value::String(content.into()));
        Self::new(NodeKind::UserMsg, data)
    }

    /// Create an `ASSIST_MSG` node.
    pub fn assistant_message(content: Value) -> Self {
        let mut data = Map::new();
        data.insert("content".into(), content);
        Self::new(NodeKind::AssistMsg, data)
    }

    /// Look up an attribute by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a string attribute by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Hierarchical index of a `PLAN_STEP` node.
    pub fn index(&self) -> Option<&str> {
        self.get_str("index")
    }

    /// Human-readable description, where the kind carries one.
    pub fn description(&self) -> Option<&str> {
        self.get_str("description")
    }

    /// Tool name of a `TOOL_CALL` node.
    pub fn tool_name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Returns `true` once a `TOOL_CALL` node has a recorded outcome.
    ///
    /// A `result` key is only present after execution, so its presence (even
    /// with a `null` value, since tools may legitimately return nothing) marks the
    /// call as done.
    pub fn has_outcome(&self) -> bool {
        self.data.contains_key("result")
            || self.data.get("error").is_some_and(|v| !v.is_null())
    }

    /// Return a copy of this node with outcome attributes merged in.
    pub fn with_outcome(&self, result: Option<Value>, error: Option<&str>, cached: bool) -> Self {
        let mut data = self.data.clone();
        data.insert("result".into(), result.unwrap_or(Value::Null));
        data.insert(
            "error".into(),
            error.map(|e| Value::String(e.into())).unwrap_or(Value::Null),
        );
        data.insert("cached".into(), json!(cached));
        Self {
            id: self.id.clone(),
            kind: self.kind,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_wire_names() {
        let kind = serde_json::to_string(&NodeKind::PlanStep).unwrap();
        assert_eq!(kind, "\"PLAN_STEP\"");
        let kind = serde_json::to_string(&NodeKind::ToolCall).unwrap();
        assert_eq!(kind, "\"TOOL_CALL\"");
    }

    #[test]
    fn plan_step_carries_index() {
        let step = GraphNode::plan_step("Check weather", "1.2");
        assert_eq!(step.kind, NodeKind::PlanStep);
        assert_eq!(step.index(), Some("1.2"));
        assert_eq!(step.description(), Some("Check weather"));
    }

    #[test]
    fn tool_call_outcome() {
        let node = GraphNode::tool_call("echo", json!({"msg": "hi"}));
        assert!(!node.has_outcome());

        let done = node.with_outcome(Some(json!({"echo": {"msg": "hi"}})), None, false);
        assert!(done.has_outcome());
        assert_eq!(done.id, node.id);
        assert_eq!(done.get("cached"), Some(&json!(false)));

        // A tool that returned null still counts as executed.
        let null_result = node.with_outcome(None, None, false);
        assert!(null_result.has_outcome());
    }
}
