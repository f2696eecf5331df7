//! Parallel worker swarm
//!
//! A [`SwarmCommander`] runs many short-lived [`Worker`]s against a shared
//! [`Hive`] blackboard and reports the proposal most of them voted for.

pub mod commander;
pub mod hive;
pub mod worker;

pub use commander::{RoundSummary, SwarmCommander, SwarmReport, SwarmSettings, VoteCount};
pub use hive::{AgentStatus, Hive, HiveEntry, HiveState, MessageKind, VoteTally};
pub use worker::{parse_response, PromptWindows, Worker, WorkerReply};
