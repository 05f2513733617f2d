//! Graph store trait
//!
//! The store is authoritative for plan structure and tool-call outcomes.
//! Implementations index edges by `src`, by `dst`, and by `(kind, src)` /
//! `(kind, dst)` so that the executor's queries stay cheap. The store is
//! single-writer per plan execution; the trait is synchronous because every
//! sanctioned implementation is an in-memory indexed structure.

use super::{EdgeKind, GraphEdge, GraphNode};
use crate::error::EngineResult;

/// Query filter for [`GraphStore::get_edges`].
///
/// All set fields must match. An empty filter returns every edge.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub kind: Option<EdgeKind>,
}

impl EdgeFilter {
    /// Match edges leaving `src`.
    pub fn from(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Self::default()
        }
    }

    /// Match edges arriving at `dst`.
    pub fn to(dst: impl Into<String>) -> Self {
        Self {
            dst: Some(dst.into()),
            ..Self::default()
        }
    }

    /// Restrict the filter to a single edge kind.
    pub fn of_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Returns `true` when the edge satisfies every set field.
    pub fn matches(&self, edge: &GraphEdge) -> bool {
        self.src.as_deref().is_none_or(|s| edge.src == s)
            && self.dst.as_deref().is_none_or(|d| edge.dst == d)
            && self.kind.is_none_or(|k| edge.kind == k)
    }
}

/// Typed node/edge store.
pub trait GraphStore: Send + Sync {
    /// Insert a new node. Fails if the id is already present.
    fn add_node(&self, node: GraphNode) -> EngineResult<()>;

    /// Replace an existing node's attribute bag. Id and kind are preserved;
    /// a kind mismatch or unknown id is an `InvalidReference`.
    fn update_node(&self, node: GraphNode) -> EngineResult<()>;

    /// Fetch a node by id.
    fn get_node(&self, id: &str) -> Option<GraphNode>;

    /// Insert an edge. Both endpoints must already exist.
    fn add_edge(&self, edge: GraphEdge) -> EngineResult<()>;

    /// Query edges. Results preserve insertion order.
    fn get_edges(&self, filter: &EdgeFilter) -> Vec<GraphEdge>;

    /// Number of nodes in the store.
    fn node_count(&self) -> usize;

    /// Number of edges in the store.
    fn edge_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches() {
        let edge = GraphEdge::plan_link("s1", "t1");

        assert!(EdgeFilter::from("s1").matches(&edge));
        assert!(EdgeFilter::from("s1").of_kind(EdgeKind::PlanLink).matches(&edge));
        assert!(!EdgeFilter::from("s1").of_kind(EdgeKind::StepOrder).matches(&edge));
        assert!(EdgeFilter::to("t1").matches(&edge));
        assert!(!EdgeFilter::to("t2").matches(&edge));
        assert!(EdgeFilter::default().matches(&edge));
    }
}
