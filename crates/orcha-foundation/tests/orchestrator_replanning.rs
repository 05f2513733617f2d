//! End-to-end orchestrator scenario: a single search step yields URLs, the
//! planner proposes a visit_url sub-plan, and execution finishes with one
//! search plus three visits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;

use orcha_foundation::store::{InMemoryGraphStore, InMemorySessionStore};
use orcha_foundation::{
    ArgType, InMemoryToolRegistry, Orchestrator, OrchestratorConfig, ToolAllowList,
};
use orcha_kernel::error::EngineResult;
use orcha_kernel::graph::{EdgeFilter, EdgeKind, GraphStore, NodeKind};
use orcha_kernel::llm::{ChatMessage, LlmClient};
use orcha_kernel::session::{EventType, SessionStore};
use orcha_kernel::tool::{FnTool, ToolRegistry};

/// Scripted planner: first call returns the initial plan, second call the
/// follow-up sub-plan, third call the summary.
struct ScriptedPlanner {
    calls: AtomicU32,
}

const PLAN_JSON: &str = r#"{
    "title": "Find the best cheese shops",
    "steps": [
        {"title": "Search for cheese shops", "tool": "search",
         "args": {"query": "best cheese shops"}, "depends_on": []}
    ]
}"#;

const SUBPLAN_JSON: &str = r#"{
    "title": "Visit the top results",
    "steps": [
        {"title": "Visit result 1", "tool": "visit_url",
         "args": {"url": "https://example.com/1"}, "depends_on": []},
        {"title": "Visit result 2", "tool": "visit_url",
         "args": {"url": "https://example.com/2"}, "depends_on": []},
        {"title": "Visit result 3", "tool": "visit_url",
         "args": {"url": "https://example.com/3"}, "depends_on": []}
    ]
}"#;

#[async_trait::async_trait]
impl LlmClient for ScriptedPlanner {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> EngineResult<ChatMessage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match call {
            0 => ChatMessage::assistant(PLAN_JSON),
            1 => ChatMessage::assistant(SUBPLAN_JSON),
            _ => ChatMessage::assistant("Three cheese shops were found and visited."),
        })
    }
}

fn registry() -> Arc<InMemoryToolRegistry> {
    let registry = InMemoryToolRegistry::shared();
    registry.register(Arc::new(FnTool::new("search", |args| async move {
        Ok(json!({
            "query": args["query"],
            "results": [
                {"url": "https://example.com/1"},
                {"url": "https://example.com/2"},
                {"url": "https://example.com/3"}
            ]
        }))
    })));
    registry.register(Arc::new(FnTool::new("visit_url", |args| async move {
        Ok(json!({ "url": args["url"], "text": "page content" }))
    })));
    registry
}

fn allow_list() -> ToolAllowList {
    ToolAllowList::new()
        .allow("search", &[("query", ArgType::String)])
        .allow("visit_url", &[("url", ArgType::String)])
}

#[tokio::test]
async fn search_result_spawns_visit_subplan() {
    let graph = InMemoryGraphStore::shared();
    let store = InMemorySessionStore::shared();
    let llm = Arc::new(ScriptedPlanner {
        calls: AtomicU32::new(0),
    });

    let orchestrator = Orchestrator::new(
        graph.clone(),
        store.clone() as Arc<dyn SessionStore>,
        registry(),
        llm.clone(),
        allow_list(),
        OrchestratorConfig::default(),
    );

    let outcome = orchestrator.run("Where to buy cheese?").await.unwrap();

    // 1 search + 3 visits.
    assert_eq!(outcome.executions.len(), 4);
    assert_eq!(
        outcome
            .executions
            .iter()
            .filter(|e| e.tool == "search")
            .count(),
        1
    );
    assert_eq!(
        outcome
            .executions
            .iter()
            .filter(|e| e.tool == "visit_url")
            .count(),
        3
    );
    assert!(outcome.executions.iter().all(|e| e.is_success()));
    assert_eq!(outcome.summary, "Three cheese shops were found and visited.");

    // The originating step gained three PLAN_STEP children.
    let plan_children =
        graph.get_edges(&EdgeFilter::from(outcome.plan_id.clone()).of_kind(EdgeKind::ParentChild));
    let search_step = plan_children
        .iter()
        .filter_map(|e| graph.get_node(&e.dst))
        .find(|n| n.index() == Some("1"))
        .expect("search step");
    let sub_steps: Vec<_> = graph
        .get_edges(&EdgeFilter::from(search_step.id.clone()).of_kind(EdgeKind::ParentChild))
        .iter()
        .filter_map(|e| graph.get_node(&e.dst))
        .filter(|n| n.kind == NodeKind::PlanStep)
        .collect();
    assert_eq!(sub_steps.len(), 3);
    for (i, sub) in sub_steps.iter().enumerate() {
        assert_eq!(sub.index(), Some(format!("1.{}", i + 1).as_str()));
    }

    // Every tool-call node carries its recorded outcome.
    for sub in &sub_steps {
        let links = graph.get_edges(&EdgeFilter::from(sub.id.clone()).of_kind(EdgeKind::PlanLink));
        assert_eq!(links.len(), 1);
        let tool_node = graph.get_node(&links[0].dst).unwrap();
        assert_eq!(tool_node.kind, NodeKind::ToolCall);
        assert!(tool_node.has_outcome());
    }

    // The session recorded the full audit trail.
    let session = store.get(&outcome.session_id).await.unwrap().unwrap();
    assert_eq!(session.events_by_type(EventType::ToolCall).count(), 4);
    assert!(session.runs.iter().all(|r| r.status.is_terminal()));
    // Exactly three LLM calls: plan, follow-up, summary.
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn done_reply_skips_subplanning() {
    struct DonePlanner {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl LlmClient for DonePlanner {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> EngineResult<ChatMessage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match call {
                0 => ChatMessage::assistant(PLAN_JSON),
                1 => ChatMessage::assistant("DONE"),
                _ => ChatMessage::assistant("Search finished."),
            })
        }
    }

    let graph = InMemoryGraphStore::shared();
    let store = InMemorySessionStore::shared();
    let orchestrator = Orchestrator::new(
        graph.clone(),
        store as Arc<dyn SessionStore>,
        registry(),
        Arc::new(DonePlanner {
            calls: AtomicU32::new(0),
        }),
        allow_list(),
        OrchestratorConfig::default(),
    );

    let outcome = orchestrator.run("Where to buy cheese?").await.unwrap();
    assert_eq!(outcome.executions.len(), 1);
    assert_eq!(outcome.executions[0].tool, "search");
}

#[tokio::test]
async fn invalid_plan_is_rejected() {
    struct BadPlanner;

    #[async_trait::async_trait]
    impl LlmClient for BadPlanner {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> EngineResult<ChatMessage> {
            // References a tool outside the allow-list.
            Ok(ChatMessage::assistant(
                r#"{"title": "bad", "steps": [
                    {"title": "nope", "tool": "rm_rf", "args": {}, "depends_on": []}
                ]}"#,
            ))
        }
    }

    let graph = InMemoryGraphStore::shared();
    let store = InMemorySessionStore::shared();
    let orchestrator = Orchestrator::new(
        graph.clone(),
        store as Arc<dyn SessionStore>,
        registry(),
        Arc::new(BadPlanner),
        allow_list(),
        OrchestratorConfig::default(),
    );

    let err = orchestrator.run("do something bad").await.unwrap_err();
    assert!(matches!(err, orcha_kernel::error::EngineError::UnknownTool(_)));
    // Nothing was persisted to the graph.
    assert_eq!(graph.node_count(), 0);
}
