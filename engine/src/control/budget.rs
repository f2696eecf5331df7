//! Compute budget tracker
//!
//! Per-turn quotas for three resource classes:
//!
//! - **Tool**: every executed tool call
//! - **Thinker**: expensive deep-reasoning calls
//! - **Api**: calls that spend money on an external service
//!
//! # Two-strikes rule
//!
//! Each call signature is remembered together with the artifact hash seen
//! when it was made. A call whose artifact hash is unchanged since the last
//! time that signature ran earns a strike; the first sighting of a signature
//! (or a sighting after the artifact state moved) starts the count at one.
//! Reaching the strike limit halts the turn: every later call is refused
//! until the next turn resets the tracker.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Reason recorded when the two-strikes rule halts a turn
pub const NO_PROGRESS_REASON: &str = "blocked: need new artifact";

/// Resource class a tool call is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Tool,
    Thinker,
    Api,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::Tool => write!(f, "tool"),
            ResourceClass::Thinker => write!(f, "thinker"),
            ResourceClass::Api => write!(f, "api"),
        }
    }
}

/// Quotas and class membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_tool_calls: u32,
    pub max_thinker_calls: u32,
    pub max_api_calls: u32,
    pub strike_limit: u32,
    pub thinker_tools: Vec<String>,
    pub api_tools: Vec<String>,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: 15,
            max_thinker_calls: 3,
            max_api_calls: 5,
            strike_limit: 2,
            thinker_tools: vec!["deep_think".to_string()],
            api_tools: Vec::new(),
        }
    }
}

/// Per-turn budget state
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    tool_calls: u32,
    thinker_calls: u32,
    api_calls: u32,
    same_args_calls: HashMap<String, (u32, String)>,
    strikes: HashMap<String, u32>,
    halted: bool,
    halt_reason: Option<String>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            tool_calls: 0,
            thinker_calls: 0,
            api_calls: 0,
            same_args_calls: HashMap::new(),
            strikes: HashMap::new(),
            halted: false,
            halt_reason: None,
        }
    }

    /// Classes a tool is charged against. Always includes [`ResourceClass::Tool`].
    pub fn classes_for(&self, tool: &str) -> Vec<ResourceClass> {
        let mut classes = vec![ResourceClass::Tool];
        if self.limits.thinker_tools.iter().any(|t| t == tool) {
            classes.push(ResourceClass::Thinker);
        }
        if self.limits.api_tools.iter().any(|t| t == tool) {
            classes.push(ResourceClass::Api);
        }
        classes
    }

    fn counter(&self, class: ResourceClass) -> (u32, u32) {
        match class {
            ResourceClass::Tool => (self.tool_calls, self.limits.max_tool_calls),
            ResourceClass::Thinker => (self.thinker_calls, self.limits.max_thinker_calls),
            ResourceClass::Api => (self.api_calls, self.limits.max_api_calls),
        }
    }

    /// Whether one more call of `class` fits. `Err` carries the reason.
    pub fn can_call(&self, class: ResourceClass) -> Result<(), String> {
        if let Some(reason) = self.halt_reason() {
            return Err(reason.to_string());
        }
        let (used, quota) = self.counter(class);
        if used >= quota {
            return Err(format!(
                "{} budget exhausted ({}/{} calls this turn)",
                class, used, quota
            ));
        }
        Ok(())
    }

    /// [`can_call`](Self::can_call) across every class `tool` is charged against
    pub fn can_call_tool(&self, tool: &str) -> Result<(), String> {
        self.classes_for(tool)
            .into_iter()
            .try_for_each(|class| self.can_call(class))
    }

    /// Charge an executed call
    pub fn record_call(&mut self, tool: &str) {
        for class in self.classes_for(tool) {
            match class {
                ResourceClass::Tool => self.tool_calls += 1,
                ResourceClass::Thinker => self.thinker_calls += 1,
                ResourceClass::Api => self.api_calls += 1,
            }
        }
        debug!(
            "Budget after '{}': tool={}/{} thinker={}/{} api={}/{}",
            tool,
            self.tool_calls,
            self.limits.max_tool_calls,
            self.thinker_calls,
            self.limits.max_thinker_calls,
            self.api_calls,
            self.limits.max_api_calls
        );
    }

    /// Apply the two-strikes rule. `Err` means the turn is now halted.
    pub fn check_repeat(&mut self, signature: &str, artifact_hash: &str) -> Result<(), String> {
        if let Some(reason) = self.halt_reason() {
            return Err(reason.to_string());
        }

        let unchanged = match self.same_args_calls.get_mut(signature) {
            Some((count, last_hash)) if last_hash == artifact_hash => {
                *count += 1;
                true
            }
            Some((count, last_hash)) => {
                *count += 1;
                *last_hash = artifact_hash.to_string();
                false
            }
            None => {
                self.same_args_calls
                    .insert(signature.to_string(), (1, artifact_hash.to_string()));
                false
            }
        };

        let strikes = self.strikes.entry(signature.to_string()).or_insert(0);
        if unchanged {
            *strikes += 1;
        } else {
            *strikes = 1;
        }

        if *strikes >= self.limits.strike_limit {
            warn!(
                "Signature {} repeated without new artifacts ({} strikes), halting turn",
                signature, strikes
            );
            self.halt(NO_PROGRESS_REASON);
            return Err(NO_PROGRESS_REASON.to_string());
        }
        Ok(())
    }

    /// Halt the turn. The first reason wins.
    pub fn halt(&mut self, reason: impl Into<String>) {
        if !self.halted {
            self.halted = true;
            self.halt_reason = Some(reason.into());
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt_reason(&self) -> Option<&str> {
        if self.halted {
            self.halt_reason.as_deref()
        } else {
            None
        }
    }

    /// True when the generic tool quota is spent
    pub fn is_exhausted(&self) -> bool {
        self.tool_calls >= self.limits.max_tool_calls
    }

    pub fn used(&self, class: ResourceClass) -> u32 {
        self.counter(class).0
    }

    pub fn strikes(&self, signature: &str) -> u32 {
        self.strikes.get(signature).copied().unwrap_or(0)
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Clear all turn-scoped state
    pub fn reset(&mut self) {
        *self = Self::new(self.limits.clone());
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(BudgetLimits::default())
    }
}
