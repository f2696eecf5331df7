//! `run_swarm`: fan a question out to the worker swarm and return the
//! consensus report.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use sdk::{EngineError, ToolOutput};

use crate::swarm::SwarmCommander;

use super::Tool;

/// Upper bound on rounds a single call may request
const MAX_ROUNDS: u32 = 10;

pub struct SwarmTool {
    commander: Arc<SwarmCommander>,
    default_agents: usize,
    default_rounds: u32,
    max_agents: usize,
}

impl SwarmTool {
    pub fn new(
        commander: Arc<SwarmCommander>,
        default_agents: usize,
        default_rounds: u32,
        max_agents: usize,
    ) -> Self {
        Self {
            commander,
            default_agents,
            default_rounds,
            max_agents: max_agents.max(1),
        }
    }

    /// Agents and rounds for a call, after defaults and clamping
    fn sizing(&self, args: &Value) -> (usize, u32) {
        let agents = args
            .get("num_agents")
            .and_then(Value::as_u64)
            .map_or(self.default_agents, |n| {
                usize::try_from(n).unwrap_or(usize::MAX)
            })
            .clamp(1, self.max_agents);
        let rounds = args
            .get("rounds")
            .and_then(Value::as_u64)
            .map_or(self.default_rounds, |n| n.min(u64::from(MAX_ROUNDS)) as u32)
            .clamp(1, MAX_ROUNDS);
        (agents, rounds)
    }
}

#[async_trait]
impl Tool for SwarmTool {
    fn name(&self) -> &str {
        "run_swarm"
    }

    fn description(&self) -> &str {
        "Ask a swarm of small parallel agents to work on a question and vote on an answer. Returns the consensus."
    }

    fn usage(&self) -> &str {
        r#"{"task": "question for the swarm", "num_agents": 50, "rounds": 2}"#
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EngineError::ToolError("missing required argument 'task'".into()))?;
        let (agents, rounds) = self.sizing(args);

        let report = self.commander.run_swarm(task, agents, rounds).await;
        info!(
            "Swarm finished: {}/{} agents succeeded, consensus: {:?}",
            report.successful, report.agents_deployed, report.consensus
        );

        let data = serde_json::to_value(&report)
            .map_err(|e| EngineError::ToolError(format!("failed to encode swarm report: {}", e)))?;
        Ok(ToolOutput::json(data))
    }
}
