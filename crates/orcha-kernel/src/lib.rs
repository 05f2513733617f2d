//! Orcha Kernel: core types and trait boundaries for the tool-orchestration
//! engine.
//!
//! This crate owns the data model and the seams between components:
//!
//! - [`graph`]: typed node/edge model and the [`graph::GraphStore`] trait
//! - [`session`]: append-only event log, run lifecycle, and the async
//!   [`session::SessionStore`] trait
//! - [`plan`]: the author-facing plan builder with hierarchical indices
//! - [`llm`]: chat message types and the [`llm::LlmClient`] callback trait
//! - [`tool`]: the [`tool::Tool`] interface and registry trait
//!
//! Concrete stores, the executor, the processor, and the orchestrator live in
//! `orcha-foundation`.

pub mod error;
pub mod graph;
pub mod llm;
pub mod plan;
pub mod session;
pub mod tool;

pub use error::{EngineError, EngineResult};

/// Commonly used types, re-exported for downstream crates.
pub mod prelude {
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::graph::{EdgeFilter, EdgeKind, GraphEdge, GraphNode, GraphStore, NodeKind};
    pub use crate::llm::{ChatMessage, FunctionCall, LlmClient, Role, ToolCallRequest};
    pub use crate::plan::PlanBuilder;
    pub use crate::session::{
        EventSource, EventType, RunStatus, Session, SessionEvent, SessionRun, SessionStore,
        TokenUsage,
    };
    pub use crate::tool::{FnTool, Tool, ToolRegistry};
}
