//! Tool-call guard
//!
//! Turn-scoped policy that sits in front of every tool invocation:
//!
//! 1. Hard ceiling on executed calls per turn
//! 2. Exact duplicates (signature seen within the recent window) are not
//!    executed; the earlier result is returned and nothing is counted
//! 3. Consecutive-repeat breaker on the tool *name*, regardless of arguments
//!
//! The guard never blocks and never performs I/O. It is reset at the start
//! of every user turn.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use super::signature::{result_hash, signature};

/// Default ceiling on executed calls per turn
pub const DEFAULT_MAX_CALLS: usize = 12;

/// Default consecutive same-tool threshold
pub const DEFAULT_MAX_CONSECUTIVE: usize = 3;

/// Default size of the recent-signature ring
pub const DEFAULT_RECENT_WINDOW: usize = 5;

/// Guard limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardLimits {
    pub max_calls: usize,
    pub max_consecutive: usize,
    pub recent_window: usize,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            max_consecutive: DEFAULT_MAX_CONSECUTIVE,
            recent_window: DEFAULT_RECENT_WINDOW,
        }
    }
}

/// Outcome of checking a prospective call
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    /// Execute the call, then report it with [`ToolCallGuard::record_call`]
    Allow { signature: String },

    /// Exact repeat of a recent call; `result` is what it returned
    Duplicate {
        signature: String,
        result: Option<Value>,
    },

    /// Declined with a human-readable reason
    Reject { reason: String },
}

/// Per-turn guard state
#[derive(Debug, Clone)]
pub struct ToolCallGuard {
    limits: GuardLimits,
    recent_signatures: VecDeque<String>,
    result_hashes: HashMap<String, String>,
    results: HashMap<String, Value>,
    consecutive_same_tool_count: usize,
    last_tool_name: Option<String>,
    total_calls: usize,
}

impl ToolCallGuard {
    pub fn new(limits: GuardLimits) -> Self {
        Self {
            limits,
            recent_signatures: VecDeque::with_capacity(limits.recent_window),
            result_hashes: HashMap::new(),
            results: HashMap::new(),
            consecutive_same_tool_count: 0,
            last_tool_name: None,
            total_calls: 0,
        }
    }

    /// Decide whether `(tool, args)` may run. Does not mutate state.
    pub fn check(&self, tool: &str, args: &Value) -> GuardDecision {
        let signature = signature(tool, args);

        if self.total_calls >= self.limits.max_calls {
            warn!(
                "Tool call '{}' rejected: {}/{} calls used this turn",
                tool, self.total_calls, self.limits.max_calls
            );
            return GuardDecision::Reject {
                reason: format!(
                    "Tool budget exhausted ({} calls this turn). Respond with what you have.",
                    self.limits.max_calls
                ),
            };
        }

        if self.recent_signatures.contains(&signature) {
            debug!("Duplicate call to '{}' ({}) served from guard", tool, signature);
            let result = self.results.get(&signature).cloned();
            return GuardDecision::Duplicate { signature, result };
        }

        let streak = self.streak_for(tool);
        if streak >= self.limits.max_consecutive {
            warn!("Tool '{}' called {} times consecutively", tool, streak);
            return GuardDecision::Reject {
                reason: format!(
                    "{} called {} times consecutively. Respond now with what you have.",
                    tool, streak
                ),
            };
        }

        GuardDecision::Allow { signature }
    }

    /// Record an executed call and its result
    pub fn record_call(&mut self, tool: &str, signature: &str, result: &Value) {
        self.consecutive_same_tool_count = self.streak_for(tool);
        self.last_tool_name = Some(tool.to_string());
        self.total_calls += 1;

        if !self.recent_signatures.iter().any(|s| s == signature) {
            self.recent_signatures.push_back(signature.to_string());
        }
        while self.recent_signatures.len() > self.limits.recent_window {
            if let Some(evicted) = self.recent_signatures.pop_front() {
                self.results.remove(&evicted);
            }
        }

        self.result_hashes
            .insert(signature.to_string(), result_hash(result));
        self.results.insert(signature.to_string(), result.clone());
    }

    /// Streak length this call would produce
    fn streak_for(&self, tool: &str) -> usize {
        if self.last_tool_name.as_deref() == Some(tool) {
            self.consecutive_same_tool_count + 1
        } else {
            1
        }
    }

    /// Clear all turn-scoped state
    pub fn reset(&mut self) {
        *self = Self::new(self.limits);
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_calls >= self.limits.max_calls
    }

    pub fn limits(&self) -> GuardLimits {
        self.limits
    }

    pub fn last_result_hash(&self, signature: &str) -> Option<&str> {
        self.result_hashes.get(signature).map(String::as_str)
    }

    pub fn recent_signatures(&self) -> impl Iterator<Item = &str> {
        self.recent_signatures.iter().map(String::as_str)
    }
}

impl Default for ToolCallGuard {
    fn default() -> Self {
        Self::new(GuardLimits::default())
    }
}
