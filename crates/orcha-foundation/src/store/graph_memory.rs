//! In-memory graph store
//!
//! Thread-safe node/edge store with four edge indexes: by `src`, by `dst`,
//! and by `(kind, src)` / `(kind, dst)`. Queries pick the narrowest index
//! for the filter and preserve insertion order within a bucket.

use std::collections::HashMap;

use parking_lot::RwLock;

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::graph::{EdgeFilter, EdgeKind, GraphEdge, GraphNode, GraphStore};

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    by_src: HashMap<String, Vec<usize>>,
    by_dst: HashMap<String, Vec<usize>>,
    by_kind_src: HashMap<(EdgeKind, String), Vec<usize>>,
    by_kind_dst: HashMap<(EdgeKind, String), Vec<usize>>,
}

/// Thread-safe in-memory [`GraphStore`].
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<GraphInner>,
}

impl InMemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared handle.
    pub fn shared() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new())
    }
}

impl GraphStore for InMemoryGraphStore {
    fn add_node(&self, node: GraphNode) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if inner.nodes.contains_key(&node.id) {
            return Err(EngineError::StoreFailure(format!(
                "node {} already exists",
                node.id
            )));
        }
        inner.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn update_node(&self, node: GraphNode) -> EngineResult<()> {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(&node.id) {
            Some(existing) => {
                if existing.kind != node.kind {
                    return Err(EngineError::InvalidReference(format!(
                        "node {} kind mismatch on update",
                        node.id
                    )));
                }
                existing.data = node.data;
                Ok(())
            }
            None => Err(EngineError::InvalidReference(format!(
                "node {} does not exist",
                node.id
            ))),
        }
    }

    fn get_node(&self, id: &str) -> Option<GraphNode> {
        self.inner.read().nodes.get(id).cloned()
    }

    fn add_edge(&self, edge: GraphEdge) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if !inner.nodes.contains_key(&edge.src) {
            return Err(EngineError::InvalidReference(format!(
                "edge source {} does not exist",
                edge.src
            )));
        }
        if !inner.nodes.contains_key(&edge.dst) {
            return Err(EngineError::InvalidReference(format!(
                "edge destination {} does not exist",
                edge.dst
            )));
        }

        let idx = inner.edges.len();
        inner.by_src.entry(edge.src.clone()).or_default().push(idx);
        inner.by_dst.entry(edge.dst.clone()).or_default().push(idx);
        inner
            .by_kind_src
            .entry((edge.kind, edge.src.clone()))
            .or_default()
            .push(idx);
        inner
            .by_kind_dst
            .entry((edge.kind, edge.dst.clone()))
            .or_default()
            .push(idx);
        inner.edges.push(edge);
        Ok(())
    }

    fn get_edges(&self, filter: &EdgeFilter) -> Vec<GraphEdge> {
        let inner = self.inner.read();

        let bucket: Option<&Vec<usize>> = match (&filter.src, &filter.dst, filter.kind) {
            (Some(src), _, Some(kind)) => inner.by_kind_src.get(&(kind, src.clone())),
            (Some(src), _, None) => inner.by_src.get(src),
            (None, Some(dst), Some(kind)) => inner.by_kind_dst.get(&(kind, dst.clone())),
            (None, Some(dst), None) => inner.by_dst.get(dst),
            (None, None, _) => None,
        };

        match bucket {
            Some(indices) => indices
                .iter()
                .map(|&i| &inner.edges[i])
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
            None if filter.src.is_none() && filter.dst.is_none() => inner
                .edges
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> (InMemoryGraphStore, String, String, String) {
        let store = InMemoryGraphStore::new();
        let plan = GraphNode::plan("demo");
        let step = GraphNode::plan_step("first", "1");
        let tool = GraphNode::tool_call("echo", json!({"msg": "hi"}));
        let (p, s, t) = (plan.id.clone(), step.id.clone(), tool.id.clone());
        store.add_node(plan).unwrap();
        store.add_node(step).unwrap();
        store.add_node(tool).unwrap();
        store.add_edge(GraphEdge::parent_child(p.clone(), s.clone())).unwrap();
        store.add_edge(GraphEdge::plan_link(s.clone(), t.clone())).unwrap();
        (store, p, s, t)
    }

    #[test]
    fn duplicate_node_rejected() {
        let store = InMemoryGraphStore::new();
        let node = GraphNode::plan("demo");
        let dup = node.clone();
        store.add_node(node).unwrap();
        assert!(store.add_node(dup).is_err());
    }

    #[test]
    fn edge_endpoints_must_exist() {
        let store = InMemoryGraphStore::new();
        let node = GraphNode::plan("demo");
        let id = node.id.clone();
        store.add_node(node).unwrap();

        let err = store
            .add_edge(GraphEdge::parent_child(id.clone(), "missing"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference(_)));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn indexed_queries() {
        let (store, plan, step, tool) = seeded();

        let from_plan = store.get_edges(&EdgeFilter::from(plan.clone()));
        assert_eq!(from_plan.len(), 1);
        assert_eq!(from_plan[0].dst, step);

        let links = store.get_edges(&EdgeFilter::from(step.clone()).of_kind(EdgeKind::PlanLink));
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].dst, tool);

        let to_tool = store.get_edges(&EdgeFilter::to(tool.clone()).of_kind(EdgeKind::PlanLink));
        assert_eq!(to_tool.len(), 1);

        let none = store.get_edges(&EdgeFilter::from(step).of_kind(EdgeKind::StepOrder));
        assert!(none.is_empty());

        let all = store.get_edges(&EdgeFilter::default());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn update_preserves_id_and_kind() {
        let (store, _, _, tool) = seeded();

        let node = store.get_node(&tool).unwrap();
        let updated = node.with_outcome(Some(json!({"echo": {"msg": "hi"}})), None, false);
        store.update_node(updated).unwrap();

        let node = store.get_node(&tool).unwrap();
        assert!(node.has_outcome());

        // Kind mismatch is rejected.
        let wrong = GraphNode::with_id(tool.clone(), orcha_kernel::graph::NodeKind::Summary, Default::default());
        assert!(store.update_node(wrong).is_err());

        // Unknown id is rejected.
        let missing = GraphNode::plan("nope");
        assert!(store.update_node(missing).is_err());
    }
}
