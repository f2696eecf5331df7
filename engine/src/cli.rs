//! CLI interface for Brain
//!
//! Defines the commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Brain agent engine
///
/// A commander model that works through bounded, cached tool calls and can
/// hand a problem to a swarm of small local workers.
#[derive(Parser, Debug)]
#[command(name = "brain")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive session with the commander, one turn per line
    Chat,

    /// Run a single commander turn
    Run {
        /// The task to execute
        task: String,
    },

    /// Run a swarm directly and print its report
    Swarm {
        /// Problem for the swarm to work on
        task: String,

        /// Number of workers (defaults to swarm.default_agents)
        #[arg(short, long)]
        agents: Option<usize>,

        /// Number of rounds (defaults to swarm.default_rounds)
        #[arg(short, long)]
        rounds: Option<u32>,
    },

    /// Print the persisted hive blackboard
    Hive,

    /// Inspect or clear the tool result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Result cache actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Show entry count and backing file
    Stats,

    /// Remove every cached result
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["brain", "chat"]);
        assert!(matches!(cli.command, Command::Chat));
        assert!(!cli.json);
        assert!(cli.log.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["brain", "--json", "--log", "debug", "hive"]);
        assert!(cli.json);
        assert_eq!(cli.log.as_deref(), Some("debug"));

        let cli = Cli::parse_from(["brain", "hive", "--config", "/tmp/brain.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/brain.toml")));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["brain", "run", "list the workspace"]);
        if let Command::Run { task } = cli.command {
            assert_eq!(task, "list the workspace");
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_swarm_command() {
        let cli = Cli::parse_from(["brain", "swarm", "find the bug", "--agents", "4", "-r", "3"]);
        if let Command::Swarm {
            task,
            agents,
            rounds,
        } = cli.command
        {
            assert_eq!(task, "find the bug");
            assert_eq!(agents, Some(4));
            assert_eq!(rounds, Some(3));
        } else {
            panic!("Expected Swarm command");
        }
    }

    #[test]
    fn test_swarm_defaults_left_to_config() {
        let cli = Cli::parse_from(["brain", "swarm", "x"]);
        assert!(matches!(
            cli.command,
            Command::Swarm {
                agents: None,
                rounds: None,
                ..
            }
        ));
    }

    #[test]
    fn test_cache_actions() {
        let cli = Cli::parse_from(["brain", "cache", "stats"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Stats
            }
        ));

        let cli = Cli::parse_from(["brain", "cache", "clear"]);
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clear
            }
        ));
    }

    #[test]
    fn test_missing_task_is_an_error() {
        assert!(Cli::try_parse_from(["brain", "run"]).is_err());
    }
}
