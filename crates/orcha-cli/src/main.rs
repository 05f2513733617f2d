//! orcha: iterative planning CLI
//!
//! ```text
//! $ OPENAI_API_KEY=... orcha "Where is the best place to buy cheese in the UK?"
//! ```
//!
//! Asks the planner LLM for a JSON plan over the demo tools, executes it
//! with the plan executor, re-plans on search evidence, and prints the
//! outline, tool results, and a one-sentence summary.

mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use orcha_foundation::llm_http::{OpenAiCompatClient, OpenAiCompatConfig};
use orcha_foundation::{
    ArgType, ExecutorConfig, InMemoryGraphStore, InMemoryToolRegistry, Orchestrator,
    OrchestratorConfig, ProcessorConfig, ToolAllowList,
};
use orcha_foundation::store::{FileSessionStore, InMemorySessionStore};
use orcha_kernel::session::SessionStore;
use orcha_kernel::tool::ToolRegistry;

#[derive(Parser)]
#[command(name = "orcha", version, about = "LLM tool-orchestration demo")]
struct Cli {
    /// User question / task.
    query: String,

    /// Persist sessions as JSON files under this directory instead of
    /// keeping them in memory.
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Model id for the planner and summarizer.
    #[arg(long, env = "ORCHA_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Maximum plan steps running concurrently within a batch.
    #[arg(long, default_value_t = 3)]
    max_parallel: usize,

    /// Disable the tool result cache.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orcha=info")),
        )
        .init();

    let cli = Cli::parse();

    let llm_config = OpenAiCompatConfig::from_env()
        .context("the planner needs an LLM provider; set OPENAI_API_KEY")?
        .with_model(&cli.model);
    let llm = Arc::new(OpenAiCompatClient::new(llm_config)?);

    let graph = InMemoryGraphStore::shared();
    let store: Arc<dyn SessionStore> = match &cli.session_dir {
        Some(dir) => Arc::new(
            FileSessionStore::new(dir.clone())
                .await
                .with_context(|| format!("opening session dir {}", dir.display()))?,
        ),
        None => InMemorySessionStore::shared(),
    };

    let registry = InMemoryToolRegistry::shared();
    for tool in tools::demo_tools() {
        registry.register(tool);
    }

    let allow = ToolAllowList::new()
        .allow("weather", &[("location", ArgType::String)])
        .allow("search", &[("query", ArgType::String)])
        .allow("visit_url", &[("url", ArgType::String)])
        .allow(
            "calculator",
            &[
                ("op", ArgType::String),
                ("a", ArgType::Number),
                ("b", ArgType::Number),
            ],
        );

    let config = OrchestratorConfig {
        executor: ExecutorConfig::default().with_max_parallel_steps(cli.max_parallel),
        processor: ProcessorConfig::default().with_caching(!cli.no_cache),
        ..OrchestratorConfig::default()
    };

    let orchestrator = Orchestrator::new(graph, store, registry, llm, allow, config);
    let outcome = orchestrator.run(&cli.query).await?;

    println!("\nPLAN (validated)\n");
    println!("{}\n", outcome.outline);

    println!("TOOL RESULTS\n");
    for execution in &outcome.executions {
        match &execution.error {
            Some(error) => println!("[{}] FAILED: {error}\n", execution.tool),
            None => println!(
                "[{}] {}\n",
                execution.tool,
                serde_json::to_string_pretty(&execution.result)?
            ),
        }
    }

    println!("SUMMARY\n");
    println!("{}\n", outcome.summary);

    Ok(())
}
