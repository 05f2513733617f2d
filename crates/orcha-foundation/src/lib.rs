//! Orcha Foundation: concrete building blocks for the orchestration engine.
//!
//! Implements the seams declared in `orcha-kernel`:
//!
//! - [`store`]: in-memory graph store, in-memory and file-backed session
//!   stores, and the serialized [`store::SessionWriter`]
//! - [`registry`]: in-memory tool registry
//! - [`processor`]: session-aware tool processor (caching, retry, events)
//! - [`executor`]: dependency-ordered batch execution of plans
//! - [`prompt`]: strategy-based prompt reconstruction with truncation
//! - [`orchestrator`]: the goal/plan/execute/re-plan/summarize loop
//! - [`llm_http`]: OpenAI-compatible HTTP client for [`orcha_kernel::llm::LlmClient`]

pub mod executor;
pub mod llm_http;
pub mod orchestrator;
pub mod plan_spec;
pub mod processor;
pub mod prompt;
pub mod registry;
pub mod store;

pub use executor::{ExecutorConfig, PlanExecutor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorOutcome};
pub use plan_spec::{ArgType, PlanSpec, StepSpec, ToolAllowList};
pub use processor::{ProcessorConfig, SessionAwareToolProcessor, ToolExecution};
pub use prompt::{PromptStrategy, build_prompt, truncate_to_budget};
pub use registry::InMemoryToolRegistry;
pub use store::{FileSessionStore, InMemoryGraphStore, InMemorySessionStore, SessionWriter};
