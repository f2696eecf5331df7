//! Command handlers for CLI operations
//!
//! - chat: interactive commander session over stdin
//! - run: a single commander turn
//! - swarm: run a swarm directly and print its report
//! - hive: print the persisted blackboard
//! - cache: show stats or clear the result cache

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::agent::{AgentCore, TurnResult};
use crate::cli::CacheAction;
use crate::config::Config;
use crate::control::ResultCache;
use crate::llm::{AnthropicProvider, LLMProvider, OllamaProvider, RetryPolicy};
use crate::swarm::{Hive, HiveState, SwarmCommander, SwarmReport, Worker};
use crate::tools::{
    DeepThinkTool, ListDirTool, ReadFileTool, SwarmTool, ToolRegistry, Workspace, WriteFileTool,
};

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Model driving the commander loop
///
/// Anthropic when its API key is set, otherwise the local executor model.
pub fn build_commander_provider(config: &Config) -> Arc<dyn LLMProvider> {
    let key = std::env::var(&config.llm.commander.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());

    match key {
        Some(key) => Arc::new(AnthropicProvider::new(
            config.llm.commander.clone(),
            Some(key),
        )),
        None => {
            warn!(
                "{} is not set, using local model {} as commander",
                config.llm.commander.api_key_env, config.llm.executor_model
            );
            Arc::new(
                OllamaProvider::new(&config.llm.ollama_base_url, &config.llm.executor_model)
                    .with_timeout(config.request_timeout()),
            )
        }
    }
}

/// Hive, worker pool and swarm commander from config
pub fn build_swarm(config: &Config) -> Arc<SwarmCommander> {
    let hive = Arc::new(Hive::open(&config.swarm.hive_file));

    let worker_provider = OllamaProvider::new(&config.llm.ollama_base_url, &config.llm.worker_model)
        .with_options(config.worker_options())
        .with_timeout(config.worker_timeout());
    let worker = Worker::new(Arc::new(worker_provider), config.worker_timeout())
        .with_windows(config.prompt_windows());

    Arc::new(SwarmCommander::new(
        hive,
        Arc::new(worker),
        config.swarm_settings(),
    ))
}

/// Built-in tools: workspace files, deep thinking, and the swarm
pub fn build_tools(config: &Config, swarm: Arc<SwarmCommander>) -> ToolRegistry {
    let workspace = Arc::new(Workspace::new(&config.core.workspace));
    let thinker = OllamaProvider::new(&config.llm.ollama_base_url, &config.llm.thinker_model)
        .with_timeout(config.request_timeout());

    ToolRegistry::empty()
        .with(Arc::new(ReadFileTool::new(Arc::clone(&workspace))))
        .with(Arc::new(ListDirTool::new(Arc::clone(&workspace))))
        .with(Arc::new(WriteFileTool::new(workspace)))
        .with(Arc::new(DeepThinkTool::new(
            Arc::new(thinker),
            RetryPolicy::commander(),
        )))
        .with(Arc::new(SwarmTool::new(
            swarm,
            config.swarm.default_agents,
            config.swarm.default_rounds,
            config.swarm.max_agents,
        )))
}

/// Commander agent with every built-in tool and the persistent cache
pub fn build_agent(config: &Config) -> AgentCore {
    let cache = Arc::new(ResultCache::open(&config.cache.file, config.cache.capacity));
    let tools = Arc::new(build_tools(config, build_swarm(config)));

    AgentCore::new(
        build_commander_provider(config),
        tools,
        cache,
        config.agent_settings(),
    )
}

/// Run a single commander turn
pub async fn handle_run(task: String, config: &Config, format: OutputFormat) -> Result<()> {
    let mut agent = build_agent(config);

    if format == OutputFormat::Text {
        println!("Executing task: {}", task);
        println!();
    }

    let result = agent.process_turn(&task).await;

    match result {
        Ok(turn) => {
            print_turn(&turn, format)?;
            if format == OutputFormat::Text {
                println!("  Usage: {}", agent.usage().summary());
            }
            Ok(())
        }
        Err(e) => {
            match format {
                OutputFormat::Text => println!("✗ Task failed: {:#}", e),
                OutputFormat::Json => {
                    let output = json!({
                        "status": "failed",
                        "error": format!("{:#}", e),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Err(e)
        }
    }
}

/// Interactive session; `exit` or `quit` ends it
pub async fn handle_chat(config: &Config, format: OutputFormat) -> Result<()> {
    let mut agent = build_agent(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    if format == OutputFormat::Text {
        println!("Brain chat. Type 'exit' to quit.");
    }

    loop {
        if format == OutputFormat::Text {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        // A failed turn ends that turn, not the session
        match agent.process_turn(input).await {
            Ok(turn) => print_turn(&turn, format)?,
            Err(e) => {
                warn!("Turn failed: {:#}", e);
                match format {
                    OutputFormat::Text => println!("✗ {:#}", e),
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::to_string(&json!({"status": "failed", "error": format!("{:#}", e)}))?
                    ),
                }
            }
        }
    }

    let usage = agent.usage();
    info!("Session ended: {}", usage.summary());
    match format {
        OutputFormat::Text => println!("{}", usage.summary()),
        OutputFormat::Json => println!("{}", serde_json::to_string(&json!({"usage": usage}))?),
    }

    Ok(())
}

fn print_turn(turn: &TurnResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", turn.answer);
            println!();
            if let Some(reason) = &turn.forced_reason {
                println!("  Tools stopped: {}", reason);
            }
            println!(
                "  Iterations: {} | tools: {} executed, {} cached, {} blocked | {}ms",
                turn.iterations,
                turn.stats.executed,
                turn.stats.cached,
                turn.stats.blocked,
                turn.duration_ms
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "completed",
                "answer": turn.answer,
                "iterations": turn.iterations,
                "forced_reason": turn.forced_reason,
                "stats": turn.stats,
                "duration_ms": turn.duration_ms,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Run a swarm directly
pub async fn handle_swarm(
    task: String,
    agents: Option<usize>,
    rounds: Option<u32>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let agents = agents
        .unwrap_or(config.swarm.default_agents)
        .clamp(1, config.swarm.max_agents);
    let rounds = rounds.unwrap_or(config.swarm.default_rounds).max(1);

    let commander = build_swarm(config);
    let report = commander.run_swarm(&task, agents, rounds).await;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_report(report: &SwarmReport) {
    println!("Swarm: {}", report.task);
    println!(
        "  Agents: {} deployed, {} succeeded, {} failed",
        report.agents_deployed, report.successful, report.failed
    );
    for round in &report.rounds {
        println!(
            "  Round {}: {} ok, {} failed",
            round.round, round.successful, round.failed
        );
    }
    println!(
        "  Hive: {} discoveries, {} solutions",
        report.discoveries, report.solutions
    );
    println!();

    match &report.consensus {
        Some(consensus) => println!("Consensus: {}", consensus),
        None => println!("No consensus"),
    }
    for vote in &report.votes {
        println!("  [{}] {}", vote.votes, vote.proposal);
    }

    if !report.top_discoveries.is_empty() {
        println!();
        println!("Recent discoveries:");
        for discovery in &report.top_discoveries {
            println!("  - {}", discovery);
        }
    }
}

/// Print the persisted blackboard
pub async fn handle_hive(config: &Config, format: OutputFormat) -> Result<()> {
    let state = Hive::open(&config.swarm.hive_file).read_all();

    match format {
        OutputFormat::Text => print_hive(&state),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
    }
    Ok(())
}

fn print_hive(state: &HiveState) {
    if state.task.is_empty() && state.agent_status.is_empty() {
        println!("Hive is empty");
        return;
    }

    println!("Task: {}", state.task);
    println!("Agents: {}", state.agent_status.len());
    println!(
        "Discoveries: {} | Solutions: {} | Errors: {}",
        state.discoveries.len(),
        state.solutions.len(),
        state.errors.len()
    );
    match state.consensus() {
        Some(consensus) => println!("Consensus: {}", consensus),
        None => println!("Consensus: none"),
    }
    for (proposal, votes) in state.vote_counts() {
        println!("  [{}] {}", votes, proposal);
    }
}

/// Show or clear the result cache
pub async fn handle_cache(action: CacheAction, config: &Config, format: OutputFormat) -> Result<()> {
    let cache = ResultCache::open(&config.cache.file, config.cache.capacity);

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            match format {
                OutputFormat::Text => {
                    println!("Cache file: {}", config.cache.file.display());
                    println!("Entries: {} / {}", stats.entries, config.cache.capacity);
                }
                OutputFormat::Json => {
                    let output = json!({
                        "file": config.cache.file,
                        "capacity": config.cache.capacity,
                        "entries": stats.entries,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
        CacheAction::Clear => {
            let removed = cache.len();
            cache.clear();
            match format {
                OutputFormat::Text => println!("Cleared {} cached result(s)", removed),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({"cleared": removed}))?)
                }
            }
        }
    }
    Ok(())
}
