//! Graph edges
//!
//! Edges are directed, typed links between node ids. The kind set is closed:
//! new relationship flavors go through `Custom` rather than new variants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator for graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Structural hierarchy (plan → step, step → sub-step, tool call → run).
    ParentChild,
    /// Temporal order between sibling nodes.
    Next,
    /// A plan step to the tool call it owns.
    PlanLink,
    /// `STEP_ORDER(a → b)` means b depends on a.
    StepOrder,
    /// Application-defined relationship.
    Custom,
}

/// A directed, typed link between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Unique edge id.
    pub id: String,

    /// Edge kind discriminator.
    pub kind: EdgeKind,

    /// Source node id.
    pub src: String,

    /// Destination node id.
    pub dst: String,
}

impl GraphEdge {
    /// Create an edge with a fresh id.
    pub fn new(kind: EdgeKind, src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            src: src.into(),
            dst: dst.into(),
        }
    }

    /// Hierarchy edge.
    pub fn parent_child(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self::new(EdgeKind::ParentChild, src, dst)
    }

    /// Step-to-tool-call edge.
    pub fn plan_link(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self::new(EdgeKind::PlanLink, src, dst)
    }

    /// Dependency edge: `dst` depends on `src`.
    pub fn step_order(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self::new(EdgeKind::StepOrder, src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&EdgeKind::StepOrder).unwrap(),
            "\"STEP_ORDER\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeKind::ParentChild).unwrap(),
            "\"PARENT_CHILD\""
        );
    }

    #[test]
    fn constructors_set_kind() {
        let e = GraphEdge::step_order("a", "b");
        assert_eq!(e.kind, EdgeKind::StepOrder);
        assert_eq!(e.src, "a");
        assert_eq!(e.dst, "b");
    }
}
