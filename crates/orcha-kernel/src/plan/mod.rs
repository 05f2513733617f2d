//! Plan builder DSL
//!
//! Author-facing plan construction that hides the low-level graph
//! primitives. A plan is a hierarchy of steps ("1", "1.2", "1.2.1" …); each
//! step gets a stable id and a human-readable hierarchical index so LLMs or
//! humans can reference it. Only `PLAN`, `PLAN_STEP`, and structural edges
//! are persisted; tool-call nodes are attached later by the orchestrator,
//! an LLM, or code.
//!
//! # Example
//!
//! ```rust,ignore
//! use orcha_kernel::plan::PlanBuilder;
//!
//! let mut plan = PlanBuilder::new("Demo");
//! plan.step("Check weather")
//!     .step("Look at forecast")
//!     .up()
//!     .up()
//!     .step("Do calculation")
//!     .up()
//!     .step_after("Compile", &["1", "2"]);
//! let plan_id = plan.save(&graph)?;
//! println!("{}", plan.outline());
//! ```

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphEdge, GraphNode, GraphStore};

/// Internal mutable step record (arena entry).
#[derive(Debug, Clone)]
struct StepEntry {
    id: String,
    title: String,
    parent: Option<usize>,
    after: Vec<String>,
    children: Vec<usize>,
    index: String,
}

impl StepEntry {
    fn new(title: impl Into<String>, parent: Option<usize>, after: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            parent,
            after,
            children: Vec::new(),
            index: String::new(),
        }
    }
}

/// Builder for a plan tree with stable hierarchical indices.
///
/// The builder keeps a cursor: [`step`](Self::step) adds a child under the
/// cursor and descends into it, [`up`](Self::up) ascends. On
/// [`save`](Self::save), indices are assigned depth-first and the structure
/// is persisted. Steps added after save ([`add_step`](Self::add_step))
/// receive the next available index at their parent and are persisted
/// immediately.
#[derive(Debug)]
pub struct PlanBuilder {
    id: String,
    title: String,
    steps: Vec<StepEntry>,
    roots: Vec<usize>,
    cursor: Option<usize>,
    index_map: HashMap<String, usize>,
    saved: bool,
}

impl PlanBuilder {
    /// Start a new plan with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            steps: Vec::new(),
            roots: Vec::new(),
            cursor: None,
            index_map: HashMap::new(),
            saved: false,
        }
    }

    /// The plan node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The plan title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Add a child step under the cursor and descend into it.
    pub fn step(&mut self, title: impl Into<String>) -> &mut Self {
        self.step_after(title, &[])
    }

    /// Add a child step with dependencies (by hierarchical index) and
    /// descend into it. Dependency indices are resolved at save time.
    pub fn step_after(&mut self, title: impl Into<String>, after: &[&str]) -> &mut Self {
        let entry = StepEntry::new(
            title,
            self.cursor,
            after.iter().map(|s| s.to_string()).collect(),
        );
        let idx = self.steps.len();
        self.steps.push(entry);
        match self.cursor {
            Some(parent) => self.steps[parent].children.push(idx),
            None => self.roots.push(idx),
        }
        self.cursor = Some(idx);
        self
    }

    /// Move the cursor one level up (no-op at root).
    pub fn up(&mut self) -> &mut Self {
        self.cursor = self.cursor.and_then(|c| self.steps[c].parent);
        self
    }

    /// Graph node id of the step at a hierarchical index.
    pub fn step_id(&self, index: &str) -> Option<&str> {
        self.index_map
            .get(index)
            .map(|&i| self.steps[i].id.as_str())
    }

    /// Hierarchical index of a step node id.
    pub fn index_of(&self, step_id: &str) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.id == step_id)
            .map(|s| s.index.as_str())
            .filter(|idx| !idx.is_empty())
    }

    /// Persist the plan structure into the graph store.
    ///
    /// Assigns depth-first indices (root children are "1", "2", …; the k-th
    /// child of "1.2" is "1.2.k"), creates the `PLAN` node and one
    /// `PLAN_STEP` node per step, links everything with `PARENT_CHILD`
    /// edges, and resolves `after` lists into `STEP_ORDER` edges.
    ///
    /// Fails with `UnresolvedDependency` before touching the graph when an
    /// `after` index does not name any step.
    pub fn save(&mut self, graph: &dyn GraphStore) -> EngineResult<String> {
        if self.saved {
            return Err(EngineError::Internal(format!(
                "plan {} already saved",
                self.id
            )));
        }
        self.assign_indices();

        // Resolve dependencies up front so a bad reference emits no nodes.
        for step in &self.steps {
            for dep in &step.after {
                if !self.index_map.contains_key(dep) {
                    return Err(EngineError::UnresolvedDependency(dep.clone()));
                }
            }
        }

        graph.add_node(GraphNode::with_id(
            self.id.clone(),
            crate::graph::NodeKind::Plan,
            plan_data(&self.title),
        ))?;

        for i in self.dfs_order() {
            let step = &self.steps[i];
            graph.add_node(GraphNode::with_id(
                step.id.clone(),
                crate::graph::NodeKind::PlanStep,
                step_data(&step.title, &step.index),
            ))?;
            graph.add_edge(GraphEdge::parent_child(self.id.clone(), step.id.clone()))?;
            if let Some(parent) = step.parent {
                graph.add_edge(GraphEdge::parent_child(
                    self.steps[parent].id.clone(),
                    step.id.clone(),
                ))?;
            }
        }

        for step in &self.steps {
            for dep in &step.after {
                let dep_id = &self.steps[self.index_map[dep]].id;
                graph.add_edge(GraphEdge::step_order(dep_id.clone(), step.id.clone()))?;
            }
        }

        self.saved = true;
        Ok(self.id.clone())
    }

    /// Add a step after [`save`], possibly at runtime, and persist it
    /// immediately.
    ///
    /// `parent` is a hierarchical index to attach under (`None` → root);
    /// `after` lists extra dependencies by hierarchical index. Returns the
    /// index assigned to the new step.
    ///
    /// Fails with `InvalidReference` for an unknown parent index and
    /// `UnresolvedDependency` for an unknown `after` index.
    pub fn add_step(
        &mut self,
        graph: &dyn GraphStore,
        title: impl Into<String>,
        parent: Option<&str>,
        after: &[&str],
    ) -> EngineResult<String> {
        if !self.saved {
            return Err(EngineError::Internal(
                "add_step requires a saved plan".to_string(),
            ));
        }

        let parent_arena = match parent {
            Some(index) => Some(*self.index_map.get(index).ok_or_else(|| {
                EngineError::InvalidReference(format!("parent index {index:?} does not exist"))
            })?),
            None => None,
        };
        for dep in after {
            if !self.index_map.contains_key(*dep) {
                return Err(EngineError::UnresolvedDependency(dep.to_string()));
            }
        }

        let index = match parent_arena {
            Some(p) => format!(
                "{}.{}",
                self.steps[p].index,
                self.steps[p].children.len() + 1
            ),
            None => (self.roots.len() + 1).to_string(),
        };

        let mut entry = StepEntry::new(
            title,
            parent_arena,
            after.iter().map(|s| s.to_string()).collect(),
        );
        entry.index = index.clone();

        graph.add_node(GraphNode::with_id(
            entry.id.clone(),
            crate::graph::NodeKind::PlanStep,
            step_data(&entry.title, &entry.index),
        ))?;
        graph.add_edge(GraphEdge::parent_child(self.id.clone(), entry.id.clone()))?;
        if let Some(p) = parent_arena {
            graph.add_edge(GraphEdge::parent_child(
                self.steps[p].id.clone(),
                entry.id.clone(),
            ))?;
        }
        for dep in after {
            let dep_id = &self.steps[self.index_map[*dep]].id;
            graph.add_edge(GraphEdge::step_order(dep_id.clone(), entry.id.clone()))?;
        }

        let arena_idx = self.steps.len();
        self.steps.push(entry);
        match parent_arena {
            Some(p) => self.steps[p].children.push(arena_idx),
            None => self.roots.push(arena_idx),
        }
        self.index_map.insert(index.clone(), arena_idx);

        Ok(index)
    }

    /// Render a numbered plain-text outline for humans and LLMs.
    pub fn outline(&self) -> String {
        let mut lines = vec![format!(
            "Plan: {}   (id: {})",
            self.title,
            &self.id[..8.min(self.id.len())]
        )];
        for i in self.dfs_order() {
            let step = &self.steps[i];
            let dep = if step.after.is_empty() {
                String::new()
            } else {
                format!("   depends on {:?}", step.after)
            };
            lines.push(format!(
                "  {:<6} {:<35} (step_id: {}){}",
                step.index,
                step.title,
                &step.id[..8.min(step.id.len())],
                dep
            ));
        }
        lines.join("\n")
    }

    /// Depth-first numbering; fills `index` and `index_map`.
    fn assign_indices(&mut self) {
        if !self.index_map.is_empty() {
            return;
        }
        let mut stack: Vec<(usize, String)> = Vec::new();
        for (n, &root) in self.roots.iter().enumerate().rev() {
            stack.push((root, (n + 1).to_string()));
        }
        while let Some((i, index)) = stack.pop() {
            self.steps[i].index = index.clone();
            self.index_map.insert(index.clone(), i);
            let children = self.steps[i].children.clone();
            for (n, child) in children.into_iter().enumerate().rev() {
                stack.push((child, format!("{}.{}", index, n + 1)));
            }
        }
    }

    /// Arena indices in depth-first order.
    fn dfs_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.steps.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            order.push(i);
            for &child in self.steps[i].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

fn plan_data(title: &str) -> serde_json::Map<String, Value> {
    let mut data = serde_json::Map::new();
    data.insert("description".into(), Value::String(title.to_string()));
    data
}

fn step_data(title: &str, index: &str) -> serde_json::Map<String, Value> {
    let mut data = serde_json::Map::new();
    data.insert("description".into(), Value::String(title.to_string()));
    data.insert("index".into(), Value::String(index.to_string()));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeFilter, EdgeKind, NodeKind};
    use std::sync::Mutex;

    /// Minimal unindexed graph store for builder tests; the real indexed
    /// store lives in orcha-foundation.
    #[derive(Default)]
    struct TestGraphStore {
        nodes: Mutex<Vec<GraphNode>>,
        edges: Mutex<Vec<GraphEdge>>,
    }

    impl GraphStore for TestGraphStore {
        fn add_node(&self, node: GraphNode) -> EngineResult<()> {
            self.nodes.lock().unwrap().push(node);
            Ok(())
        }

        fn update_node(&self, node: GraphNode) -> EngineResult<()> {
            let mut nodes = self.nodes.lock().unwrap();
            match nodes.iter_mut().find(|n| n.id == node.id) {
                Some(existing) => {
                    existing.data = node.data;
                    Ok(())
                }
                None => Err(EngineError::InvalidReference(node.id)),
            }
        }

        fn get_node(&self, id: &str) -> Option<GraphNode> {
            self.nodes.lock().unwrap().iter().find(|n| n.id == id).cloned()
        }

        fn add_edge(&self, edge: GraphEdge) -> EngineResult<()> {
            self.edges.lock().unwrap().push(edge);
            Ok(())
        }

        fn get_edges(&self, filter: &EdgeFilter) -> Vec<GraphEdge> {
            self.edges
                .lock()
                .unwrap()
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect()
        }

        fn node_count(&self) -> usize {
            self.nodes.lock().unwrap().len()
        }

        fn edge_count(&self) -> usize {
            self.edges.lock().unwrap().len()
        }
    }

    fn build_demo() -> (PlanBuilder, TestGraphStore) {
        let graph = TestGraphStore::default();
        let mut plan = PlanBuilder::new("Demo");
        plan.step("Check weather")
            .step("Look at forecast")
            .up()
            .up()
            .step("Do calculation")
            .up()
            .step_after("Compile", &["1", "2"]);
        plan.save(&graph).unwrap();
        (plan, graph)
    }

    #[test]
    fn depth_first_indices() {
        let (plan, _) = build_demo();
        assert!(plan.step_id("1").is_some());
        assert!(plan.step_id("1.1").is_some());
        assert!(plan.step_id("2").is_some());
        assert!(plan.step_id("3").is_some());
        assert!(plan.step_id("1.2").is_none());
    }

    #[test]
    fn hierarchy_edges_trace_indices() {
        let (plan, graph) = build_demo();

        // "1.1" must be a PARENT_CHILD child of "1".
        let parent = plan.step_id("1").unwrap();
        let child = plan.step_id("1.1").unwrap();
        let edges = graph.get_edges(
            &EdgeFilter::from(parent.to_string()).of_kind(EdgeKind::ParentChild),
        );
        assert!(edges.iter().any(|e| e.dst == child));

        // Every step is also a PARENT_CHILD child of the plan node.
        let plan_children =
            graph.get_edges(&EdgeFilter::from(plan.id().to_string()).of_kind(EdgeKind::ParentChild));
        assert_eq!(plan_children.len(), 4);
    }

    #[test]
    fn dependencies_become_step_order_edges() {
        let (plan, graph) = build_demo();
        let compile = plan.step_id("3").unwrap();
        let deps = graph.get_edges(
            &EdgeFilter::to(compile.to_string()).of_kind(EdgeKind::StepOrder),
        );
        let dep_srcs: Vec<&str> = deps.iter().map(|e| e.src.as_str()).collect();
        assert_eq!(deps.len(), 2);
        assert!(dep_srcs.contains(&plan.step_id("1").unwrap()));
        assert!(dep_srcs.contains(&plan.step_id("2").unwrap()));
    }

    #[test]
    fn unresolved_dependency_rejected_before_persisting() {
        let graph = TestGraphStore::default();
        let mut plan = PlanBuilder::new("Bad");
        plan.step_after("Only step", &["7"]);

        let err = plan.save(&graph).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedDependency(_)));
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn add_step_after_save() {
        let (mut plan, graph) = build_demo();

        let index = plan.add_step(&graph, "Re-check forecast", Some("1"), &[]).unwrap();
        assert_eq!(index, "1.2");

        let step_node = graph.get_node(plan.step_id("1.2").unwrap()).unwrap();
        assert_eq!(step_node.kind, NodeKind::PlanStep);
        assert_eq!(step_node.index(), Some("1.2"));

        // Root-level late step gets the next root index.
        let root_index = plan.add_step(&graph, "Wrap up", None, &["3"]).unwrap();
        assert_eq!(root_index, "4");
    }

    #[test]
    fn add_step_unknown_parent() {
        let (mut plan, graph) = build_demo();
        let err = plan.add_step(&graph, "Orphan", Some("9.9"), &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference(_)));
    }

    #[test]
    fn outline_lists_every_step() {
        let (plan, _) = build_demo();
        let outline = plan.outline();
        assert!(outline.starts_with("Plan: Demo"));
        for index in ["1", "1.1", "2", "3"] {
            assert!(outline.contains(index));
        }
        assert!(outline.contains("depends on"));
    }
}
