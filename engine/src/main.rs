// Brain Engine
// Main entry point for the brain binary

use brain_engine::cli::{Cli, Command};
use brain_engine::config::Config;
use brain_engine::handlers::{
    handle_cache, handle_chat, handle_hive, handle_run, handle_swarm, OutputFormat,
};
use brain_engine::telemetry::init_telemetry_with_level;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the config file; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!(
        "Brain Engine v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Chat => handle_chat(&config, format).await,
        Command::Run { task } => handle_run(task, &config, format).await,
        Command::Swarm {
            task,
            agents,
            rounds,
        } => handle_swarm(task, agents, rounds, &config, format).await,
        Command::Hive => handle_hive(&config, format).await,
        Command::Cache { action } => handle_cache(action, &config, format).await,
    }
}
