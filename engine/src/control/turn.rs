//! One user turn of tool calls
//!
//! [`TurnController`] is the single entry point through which the commander
//! loop runs tools. Each attempt passes, in order:
//!
//! 1. the halt latch (a halted turn refuses everything)
//! 2. the guard (ceiling, duplicates, consecutive-repeat breaker)
//! 3. the budget quotas for the tool's resource classes
//! 4. the two-strikes rule
//! 5. the result cache (cacheable tools only)
//! 6. execution through the [`ToolRegistry`]
//!
//! Every path yields a [`ToolOutcome`]; nothing here returns an error.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use sdk::{Rejection, ToolOutput};

use crate::tools::ToolRegistry;

use super::budget::{BudgetLimits, BudgetTracker};
use super::cache::ResultCache;
use super::guard::{GuardDecision, GuardLimits, ToolCallGuard};
use super::signature::{artifact_hash, fingerprint};

/// What happened to one attempted call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran
    Executed(ToolOutput),

    /// Served without running, from the guard or the result cache
    Cached(Value),

    /// Declined by policy; the turn may continue
    Blocked(Rejection),

    /// The turn is halted; no further tools will run
    Halted(String),
}

impl ToolOutcome {
    /// JSON shown to the model
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutcome::Executed(output) => output.to_value(),
            ToolOutcome::Cached(result) => result.clone(),
            ToolOutcome::Blocked(rejection) => rejection.to_value(),
            ToolOutcome::Halted(reason) => Rejection::new(reason.clone()).to_value(),
        }
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, ToolOutcome::Blocked(_) | ToolOutcome::Halted(_))
    }
}

/// Per-turn counts, for logging and the usage report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TurnStats {
    pub executed: usize,
    pub cached: usize,
    pub blocked: usize,
}

pub struct TurnController {
    guard: ToolCallGuard,
    budget: BudgetTracker,
    cache: Arc<ResultCache>,
    tools: Arc<ToolRegistry>,
    artifacts: BTreeSet<String>,
    stats: TurnStats,
}

impl TurnController {
    pub fn new(
        guard_limits: GuardLimits,
        budget_limits: BudgetLimits,
        cache: Arc<ResultCache>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            guard: ToolCallGuard::new(guard_limits),
            budget: BudgetTracker::new(budget_limits),
            cache,
            tools,
            artifacts: BTreeSet::new(),
            stats: TurnStats::default(),
        }
    }

    /// Start a fresh turn. The cache is shared across turns and kept.
    pub fn reset(&mut self) {
        self.guard.reset();
        self.budget.reset();
        self.artifacts.clear();
        self.stats = TurnStats::default();
    }

    fn artifact_ids(&self) -> Vec<&str> {
        self.artifacts.iter().map(String::as_str).collect()
    }

    fn current_artifact_hash(&self) -> String {
        artifact_hash(&self.artifact_ids())
    }

    /// Attempt one tool call
    pub async fn invoke(&mut self, tool: &str, args: &Value) -> ToolOutcome {
        let outcome = self.decide_and_run(tool, args).await;
        match &outcome {
            ToolOutcome::Executed(_) => self.stats.executed += 1,
            ToolOutcome::Cached(_) => self.stats.cached += 1,
            ToolOutcome::Blocked(r) => {
                self.stats.blocked += 1;
                warn!("Blocked '{}': {}", tool, r.message);
            }
            ToolOutcome::Halted(reason) => {
                self.stats.blocked += 1;
                warn!("Refused '{}', turn halted: {}", tool, reason);
            }
        }
        outcome
    }

    async fn decide_and_run(&mut self, tool: &str, args: &Value) -> ToolOutcome {
        if let Some(reason) = self.budget.halt_reason() {
            return ToolOutcome::Halted(reason.to_string());
        }

        let signature = match self.guard.check(tool, args) {
            GuardDecision::Allow { signature } => signature,
            GuardDecision::Reject { reason } => {
                return ToolOutcome::Blocked(Rejection::new(reason));
            }
            GuardDecision::Duplicate { signature, result } => {
                // duplicates are free but still count as a repeat
                let hash = self.current_artifact_hash();
                if let Err(reason) = self.budget.check_repeat(&signature, &hash) {
                    info!("Duplicate of {} halted the turn: {}", signature, reason);
                }
                return match result {
                    Some(result) => ToolOutcome::Cached(result),
                    None => ToolOutcome::Blocked(Rejection::new(format!(
                        "{} was already called with these arguments",
                        tool
                    ))),
                };
            }
        };

        if let Err(reason) = self.budget.can_call_tool(tool) {
            return ToolOutcome::Blocked(Rejection::new(reason));
        }

        let hash = self.current_artifact_hash();
        if let Err(reason) = self.budget.check_repeat(&signature, &hash) {
            return ToolOutcome::Halted(reason);
        }

        let cacheable = self.tools.is_cacheable(tool);
        let fp = fingerprint(tool, args, &self.artifact_ids());
        if cacheable {
            if let Some(result) = self.cache.get(&fp) {
                debug!("Serving '{}' from result cache", tool);
                self.guard.record_call(tool, &signature, &result);
                return ToolOutcome::Cached(result);
            }
        }

        let output = self.tools.dispatch(tool, args).await;
        self.artifacts.extend(output.artifacts.iter().cloned());

        let value = output.to_value();
        self.guard.record_call(tool, &signature, &value);
        self.budget.record_call(tool);
        if cacheable && output.success {
            self.cache.set(fp, value);
        }

        ToolOutcome::Executed(output)
    }

    /// Reason the loop must stop calling tools and answer, if any
    pub fn must_finalize(&self) -> Option<String> {
        if let Some(reason) = self.budget.halt_reason() {
            return Some(reason.to_string());
        }
        if self.guard.is_exhausted() {
            return Some(format!(
                "tool budget exhausted ({} calls this turn)",
                self.guard.limits().max_calls
            ));
        }
        if self.budget.is_exhausted() {
            return Some(format!(
                "tool budget exhausted ({} calls this turn)",
                self.budget.limits().max_tool_calls
            ));
        }
        None
    }

    pub fn is_halted(&self) -> bool {
        self.budget.is_halted()
    }

    pub fn stats(&self) -> TurnStats {
        self.stats
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(String::as_str)
    }

    pub fn guard(&self) -> &ToolCallGuard {
        &self.guard
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::budget::NO_PROGRESS_REASON;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use sdk::EngineError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        runs: AtomicUsize,
        cacheable: bool,
    }

    impl Counting {
        fn new(name: &'static str, cacheable: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                runs: AtomicUsize::new(0),
                cacheable,
            })
        }
    }

    #[async_trait]
    impl Tool for Counting {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "counts"
        }
        fn usage(&self) -> &str {
            "{}"
        }
        fn cacheable(&self) -> bool {
            self.cacheable
        }
        async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            let out = ToolOutput::json(json!({ "run": n }));
            Ok(match args.get("artifact").and_then(Value::as_str) {
                Some(id) => out.with_artifacts(vec![id.to_string()]),
                None => out,
            })
        }
    }

    fn controller(tools: Vec<Arc<Counting>>) -> (TurnController, Arc<ResultCache>) {
        let mut registry = ToolRegistry::empty();
        for tool in tools {
            registry.register(tool);
        }
        let cache = Arc::new(ResultCache::in_memory(100));
        let turn = TurnController::new(
            GuardLimits::default(),
            BudgetLimits::default(),
            Arc::clone(&cache),
            Arc::new(registry),
        );
        (turn, cache)
    }

    #[tokio::test]
    async fn test_duplicate_is_served_then_third_call_halted() {
        let search = Counting::new("search", true);
        let (mut turn, _) = controller(vec![Arc::clone(&search)]);
        let args = json!({"q": "x"});

        let first = turn.invoke("search", &args).await;
        assert!(matches!(first, ToolOutcome::Executed(_)));

        let second = turn.invoke("search", &args).await;
        assert_eq!(second.to_value(), first.to_value());
        assert_eq!(turn.guard().total_calls(), 1);
        assert!(turn.is_halted());

        let third = turn.invoke("other", &json!({})).await;
        assert_eq!(third, ToolOutcome::Halted(NO_PROGRESS_REASON.to_string()));
        assert_eq!(search.runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            third.to_value(),
            json!({"blocked": true, "message": NO_PROGRESS_REASON})
        );
    }

    #[tokio::test]
    async fn test_cache_hit_across_turns() {
        let read = Counting::new("read", true);
        let (mut turn, cache) = controller(vec![Arc::clone(&read)]);

        turn.invoke("read", &json!({"path": "a"})).await;
        assert_eq!(cache.len(), 1);

        turn.reset();
        let again = turn.invoke("read", &json!({"path": "a"})).await;
        assert!(matches!(again, ToolOutcome::Cached(_)));
        assert_eq!(read.runs.load(Ordering::SeqCst), 1);
        assert_eq!(turn.budget().used(crate::control::ResourceClass::Tool), 0);
        assert_eq!(turn.guard().total_calls(), 1);
    }

    #[tokio::test]
    async fn test_new_artifact_changes_fingerprint() {
        let read = Counting::new("read", true);
        let write = Counting::new("write", false);
        let (mut turn, cache) = controller(vec![Arc::clone(&read), Arc::clone(&write)]);

        turn.invoke("read", &json!({"path": "dir"})).await;
        assert_eq!(cache.len(), 1);

        turn.reset();
        turn.invoke("write", &json!({"artifact": "dir/new.md"})).await;
        let after = turn.invoke("read", &json!({"path": "dir"})).await;

        assert!(matches!(after, ToolOutcome::Executed(_)));
        assert_eq!(read.runs.load(Ordering::SeqCst), 2);
        assert_eq!(write.runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(turn.artifacts().collect::<Vec<_>>(), vec!["dir/new.md"]);
    }

    #[tokio::test]
    async fn test_uncacheable_tools_always_run() {
        let write = Counting::new("write", false);
        let (mut turn, cache) = controller(vec![Arc::clone(&write)]);

        turn.invoke("write", &json!({"n": 1})).await;
        turn.reset();
        turn.invoke("write", &json!({"n": 1})).await;

        assert_eq!(write.runs.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ceiling_forces_finalize() {
        let a = Counting::new("a", true);
        let b = Counting::new("b", true);
        let (mut turn, _) = controller(vec![a, b]);

        for i in 0..GuardLimits::default().max_calls {
            let tool = if i % 2 == 0 { "a" } else { "b" };
            let out = turn.invoke(tool, &json!({ "i": i })).await;
            assert!(matches!(out, ToolOutcome::Executed(_)), "call {i}: {out:?}");
        }
        assert!(turn.must_finalize().is_some());

        let over = turn.invoke("a", &json!({"i": 999})).await;
        match over {
            ToolOutcome::Blocked(r) => assert!(r.message.contains("budget exhausted")),
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert_eq!(turn.stats().blocked, 1);
    }

    #[tokio::test]
    async fn test_thinker_quota_blocks_without_halting() {
        let think = Counting::new("deep_think", true);
        let other = Counting::new("other", true);
        let (mut turn, _) = controller(vec![think, other]);

        for i in 0..3 {
            turn.invoke("deep_think", &json!({ "q": i })).await;
            turn.invoke("other", &json!({ "q": i })).await;
        }
        let fourth = turn.invoke("deep_think", &json!({"q": 3})).await;
        match fourth {
            ToolOutcome::Blocked(r) => assert!(r.message.contains("thinker budget exhausted")),
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert!(!turn.is_halted());
        assert!(turn.must_finalize().is_none());
    }
}
