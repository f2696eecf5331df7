//! Hive blackboard
//!
//! Shared state for one swarm run: the task, the findings agents broadcast,
//! per-agent status and vote tallies. Every operation takes the single lock,
//! mutates, and writes the full state to disk before releasing it.
//!
//! Votes are kept as an ordered list of tallies so that consensus ties are
//! resolved by the order proposals first appeared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use sdk::errors::EngineError;

use crate::persist::{read_json, write_json};

/// Kind of a broadcast message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Discovery,
    Error,
    Solution,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Discovery => write!(f, "discovery"),
            MessageKind::Error => write!(f, "error"),
            MessageKind::Solution => write!(f, "solution"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Launching,
    Active,
    Failed,
}

/// One broadcast message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveEntry {
    pub agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Voters behind one proposal, in the order they voted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub proposal: String,
    pub voters: Vec<String>,
}

/// Full blackboard contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveState {
    pub task: String,
    pub discoveries: Vec<HiveEntry>,
    pub errors: Vec<HiveEntry>,
    pub solutions: Vec<HiveEntry>,
    pub agent_status: BTreeMap<String, AgentStatus>,
    pub votes: Vec<VoteTally>,
}

impl HiveState {
    fn entries_mut(&mut self, kind: MessageKind) -> &mut Vec<HiveEntry> {
        match kind {
            MessageKind::Discovery => &mut self.discoveries,
            MessageKind::Error => &mut self.errors,
            MessageKind::Solution => &mut self.solutions,
        }
    }

    /// Last `n` entries of `kind`, oldest first
    pub fn recent(&self, kind: MessageKind, n: usize) -> &[HiveEntry] {
        let entries = match kind {
            MessageKind::Discovery => &self.discoveries,
            MessageKind::Error => &self.errors,
            MessageKind::Solution => &self.solutions,
        };
        &entries[entries.len().saturating_sub(n)..]
    }

    /// Proposal with the most voters; the earliest proposal wins ties
    pub fn consensus(&self) -> Option<&str> {
        let mut best: Option<&VoteTally> = None;
        for tally in &self.votes {
            if tally.voters.is_empty() {
                continue;
            }
            if best.map_or(true, |b| tally.voters.len() > b.voters.len()) {
                best = Some(tally);
            }
        }
        best.map(|t| t.proposal.as_str())
    }

    pub fn vote_counts(&self) -> Vec<(String, usize)> {
        self.votes
            .iter()
            .map(|t| (t.proposal.clone(), t.voters.len()))
            .collect()
    }
}

/// Lock-guarded, file-backed blackboard
#[derive(Debug)]
pub struct Hive {
    path: Option<PathBuf>,
    state: Mutex<HiveState>,
}

impl Hive {
    /// Blackboard with no backing file
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(HiveState::default()),
        }
    }

    /// Blackboard persisted at `path`, starting from its current contents
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_json(&path).unwrap_or_default();
        Self {
            path: Some(path),
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, HiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` under the lock, then persist
    fn mutate<R>(&self, f: impl FnOnce(&mut HiveState) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        if let Err(e) = self.flush(&state) {
            warn!("{}", e);
        }
        out
    }

    fn flush(&self, state: &HiveState) -> Result<(), EngineError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json(path, state).map_err(|e| {
            EngineError::Persistence(format!(
                "failed to write hive to {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Start a new task. Findings and votes are cleared; agent status is kept.
    pub fn set_task(&self, task: impl Into<String>) {
        let task = task.into();
        debug!("Hive task set: {}", task);
        self.mutate(|state| {
            state.task = task;
            state.discoveries.clear();
            state.errors.clear();
            state.solutions.clear();
            state.votes.clear();
        });
    }

    /// Append a message and mark the sender active
    pub fn broadcast(&self, agent: &str, kind: MessageKind, content: impl Into<String>) {
        let entry = HiveEntry {
            agent: agent.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.mutate(|state| {
            state.entries_mut(kind).push(entry);
            state
                .agent_status
                .insert(agent.to_string(), AgentStatus::Active);
        });
    }

    /// Add `agent` to the voters for `proposal`. Repeat votes are ignored.
    pub fn vote(&self, agent: &str, proposal: impl Into<String>) {
        let proposal = proposal.into();
        self.mutate(|state| {
            match state.votes.iter_mut().find(|t| t.proposal == proposal) {
                Some(tally) => {
                    if !tally.voters.iter().any(|v| v == agent) {
                        tally.voters.push(agent.to_string());
                    }
                }
                None => state.votes.push(VoteTally {
                    proposal,
                    voters: vec![agent.to_string()],
                }),
            }
        });
    }

    pub fn mark_agent(&self, agent: &str, status: AgentStatus) {
        self.mutate(|state| {
            state.agent_status.insert(agent.to_string(), status);
        });
    }

    /// Set the same status for many agents with a single write
    pub fn mark_agents<I, S>(&self, agents: I, status: AgentStatus)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(|state| {
            for agent in agents {
                state.agent_status.insert(agent.into(), status);
            }
        });
    }

    /// Winning proposal, or `None` when nobody voted
    pub fn get_consensus(&self) -> Option<String> {
        self.lock().consensus().map(str::to_string)
    }

    /// Snapshot after re-reading the backing file, so writes from outside
    /// this process are picked up. Falls back to memory when the file is
    /// missing or unreadable.
    pub fn read_all(&self) -> HiveState {
        let mut state = self.lock();
        if let Some(path) = &self.path {
            if let Some(on_disk) = read_json::<HiveState>(path) {
                *state = on_disk;
            }
        }
        state.clone()
    }

    /// In-memory snapshot, without touching the file
    pub fn snapshot(&self) -> HiveState {
        self.lock().clone()
    }

    pub fn agent_count(&self) -> usize {
        self.lock().agent_status.len()
    }

    pub fn agent_status(&self, agent: &str) -> Option<AgentStatus> {
        self.lock().agent_status.get(agent).copied()
    }

    pub fn discoveries(&self) -> Vec<HiveEntry> {
        self.lock().discoveries.clone()
    }
}
