//! Commander agent loop
//!
//! [`AgentCore`] drives the commander model through tool calls for each user
//! turn, keeping a bounded [`Conversation`] and a running [`UsageTracker`].

pub mod conversation;
pub mod core;
pub mod usage;

pub use conversation::{truncate_chars, Conversation};
pub use core::{AgentCore, AgentSettings, TurnResult};
pub use usage::UsageTracker;
