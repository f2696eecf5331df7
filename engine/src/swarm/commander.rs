//! Swarm commander
//!
//! Fans a task out to `num_agents` workers for `rounds` rounds on a bounded
//! pool, then reads the consensus off the hive.
//!
//! # Timeouts
//!
//! - Per agent: bounds one worker's think-and-report once it holds a pool
//!   slot (time spent queueing for a slot does not count).
//! - Per round: bounds the whole round. Agents still running at the
//!   deadline are aborted and counted as failed.
//!
//! A failed agent never fails the round, and a round with no successes
//! still moves on to the next one.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::hive::{AgentStatus, Hive, MessageKind};
use super::worker::{parse_response, Worker};

/// Solutions are truncated to this many characters before becoming votes
const VOTE_PROPOSAL_CHARS: usize = 200;

/// Discoveries echoed in the report
const REPORT_DISCOVERIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwarmSettings {
    pub max_concurrency: usize,
    pub agent_timeout: Duration,
    pub round_timeout: Duration,
    pub round_pause: Duration,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 12,
            agent_timeout: Duration::from_secs(15),
            round_timeout: Duration::from_secs(90),
            round_pause: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteCount {
    pub proposal: String,
    pub votes: usize,
}

/// Result of a swarm run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmReport {
    pub status: String,
    pub task: String,
    pub agents_deployed: usize,
    pub successful: usize,
    pub failed: usize,
    pub discoveries: usize,
    pub solutions: usize,
    pub consensus: Option<String>,
    pub top_discoveries: Vec<String>,
    pub votes: Vec<VoteCount>,
    pub rounds: Vec<RoundSummary>,
}

pub struct SwarmCommander {
    hive: Arc<Hive>,
    worker: Arc<Worker>,
    settings: SwarmSettings,
}

impl SwarmCommander {
    pub fn new(hive: Arc<Hive>, worker: Arc<Worker>, settings: SwarmSettings) -> Self {
        Self {
            hive,
            worker,
            settings,
        }
    }

    pub fn hive(&self) -> &Arc<Hive> {
        &self.hive
    }

    pub fn settings(&self) -> &SwarmSettings {
        &self.settings
    }

    /// Run the swarm to completion. Never fails; worker failures are counted.
    pub async fn run_swarm(&self, task: &str, num_agents: usize, rounds: u32) -> SwarmReport {
        info!(
            "Swarm starting: {} agents x {} rounds on '{}'",
            num_agents, rounds, task
        );
        self.hive.set_task(task);

        let task: Arc<str> = Arc::from(task);
        let pool = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut summaries = Vec::with_capacity(rounds as usize);

        for round in 1..=rounds {
            let summary = self.run_round(round, &task, num_agents, &pool).await;
            info!(
                "Round {}/{}: {} succeeded, {} failed",
                round, rounds, summary.successful, summary.failed
            );
            summaries.push(summary);

            if round < rounds {
                sleep(self.settings.round_pause).await;
            }
        }

        self.build_report(&task, num_agents, summaries)
    }

    async fn run_round(
        &self,
        round: u32,
        task: &Arc<str>,
        num_agents: usize,
        pool: &Arc<Semaphore>,
    ) -> RoundSummary {
        let ids: Vec<String> = (0..num_agents).map(|i| format!("agent_{i}")).collect();
        self.hive.mark_agents(ids.iter().cloned(), AgentStatus::Launching);

        let mut set = JoinSet::new();
        for id in &ids {
            set.spawn(run_agent(
                id.clone(),
                Arc::clone(task),
                Arc::clone(&self.hive),
                Arc::clone(&self.worker),
                Arc::clone(pool),
                self.settings.agent_timeout,
            ));
        }

        let mut pending: HashSet<String> = ids.into_iter().collect();
        let mut successful = 0;
        let deadline = Instant::now() + self.settings.round_timeout;

        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((id, ok)))) => {
                    pending.remove(&id);
                    if ok {
                        successful += 1;
                    }
                }
                Ok(Some(Err(e))) => warn!("Swarm agent task aborted: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Round {} hit its {:?} deadline with {} agents outstanding",
                        round,
                        self.settings.round_timeout,
                        set.len()
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        // anything unaccounted for timed out with the round or panicked
        if !pending.is_empty() {
            self.hive.mark_agents(pending, AgentStatus::Failed);
        }

        RoundSummary {
            round,
            successful,
            failed: num_agents - successful,
        }
    }

    fn build_report(
        &self,
        task: &str,
        num_agents: usize,
        rounds: Vec<RoundSummary>,
    ) -> SwarmReport {
        let state = self.hive.snapshot();
        let successful = rounds.iter().map(|r| r.successful).sum();
        let failed = rounds.iter().map(|r| r.failed).sum();

        SwarmReport {
            status: "success".to_string(),
            task: task.to_string(),
            agents_deployed: num_agents * rounds.len(),
            successful,
            failed,
            discoveries: state.discoveries.len(),
            solutions: state.solutions.len(),
            consensus: state.consensus().map(str::to_string),
            top_discoveries: state
                .recent(MessageKind::Discovery, REPORT_DISCOVERIES)
                .iter()
                .map(|e| e.content.clone())
                .collect(),
            votes: state
                .vote_counts()
                .into_iter()
                .map(|(proposal, votes)| VoteCount { proposal, votes })
                .collect(),
            rounds,
        }
    }
}

/// One agent's cycle. Returns its id and whether it succeeded.
async fn run_agent(
    id: String,
    task: Arc<str>,
    hive: Arc<Hive>,
    worker: Arc<Worker>,
    pool: Arc<Semaphore>,
    agent_timeout: Duration,
) -> (String, bool) {
    let Ok(_permit) = pool.acquire_owned().await else {
        hive.mark_agent(&id, AgentStatus::Failed);
        return (id, false);
    };

    let snapshot = hive.snapshot();
    let text = match timeout(agent_timeout, worker.think(&id, &task, &snapshot)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("{} failed: {}", id, e);
            hive.mark_agent(&id, AgentStatus::Failed);
            return (id, false);
        }
        Err(_) => {
            warn!("{} timed out after {:?}", id, agent_timeout);
            hive.mark_agent(&id, AgentStatus::Failed);
            return (id, false);
        }
    };

    let reply = parse_response(&text);
    for (kind, content) in reply.messages() {
        hive.broadcast(&id, kind, content);
    }
    if let Some(solution) = reply.solution() {
        let proposal: String = solution.chars().take(VOTE_PROPOSAL_CHARS).collect();
        hive.vote(&id, proposal);
    }
    hive.mark_agent(&id, AgentStatus::Active);
    debug!("{} reported {} message(s)", id, reply.messages().len());

    (id, true)
}
