//! Integration tests for the agent-loop control plane
//!
//! Covers duplicate suppression, the per-turn ceiling, the consecutive
//! repeat breaker, the two-strikes halt and the result cache bound.

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use brain_engine::control::{
    signature, BudgetLimits, BudgetTracker, GuardDecision, GuardLimits, ResultCache,
    ToolCallGuard, ToolOutcome, TurnController, NO_PROGRESS_REASON,
};
use brain_engine::tools::{ReadFileTool, Tool, ToolRegistry, Workspace, WriteFileTool};
use sdk::{EngineError, ToolOutput};
use tempfile::TempDir;

/// Echoes its arguments and counts executions
struct CountingTool {
    name: &'static str,
    calls: AtomicUsize,
}

impl CountingTool {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "counts calls"
    }

    fn usage(&self) -> &str {
        "{}"
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ToolOutput::json(json!({ "call": n, "args": args })))
    }
}

fn turn_with(tools: &[Arc<CountingTool>]) -> TurnController {
    let mut registry = ToolRegistry::empty();
    for tool in tools {
        registry.register(Arc::clone(tool) as Arc<dyn Tool>);
    }
    TurnController::new(
        GuardLimits::default(),
        BudgetLimits::default(),
        Arc::new(ResultCache::in_memory(1000)),
        Arc::new(registry),
    )
}

/// Run `(tool, args)` through a bare guard, recording allowed calls
fn attempt(guard: &mut ToolCallGuard, tool: &str, args: Value) -> GuardDecision {
    let decision = guard.check(tool, &args);
    if let GuardDecision::Allow { signature } = &decision {
        guard.record_call(tool, signature, &json!({ "ok": tool }));
    }
    decision
}

#[tokio::test]
async fn test_idempotent_duplicates_execute_once() {
    let search = CountingTool::new("search");
    let mut turn = turn_with(&[Arc::clone(&search)]);
    let args = json!({ "q": "rust" });

    let first = match turn.invoke("search", &args).await {
        ToolOutcome::Executed(output) => output.to_value(),
        other => panic!("expected execution, got {other:?}"),
    };
    let second = turn.invoke("search", &args).await;

    assert_eq!(search.calls(), 1);
    assert_eq!(second, ToolOutcome::Cached(first));
    assert_eq!(turn.guard().total_calls(), 1);
}

#[test]
fn test_ceiling_rejects_the_next_distinct_call() {
    let mut guard = ToolCallGuard::new(GuardLimits::default());

    for i in 0..12 {
        let tool = if i % 2 == 0 { "read" } else { "list" };
        let decision = attempt(&mut guard, tool, json!({ "i": i }));
        assert!(matches!(decision, GuardDecision::Allow { .. }), "call {i}");
    }

    match attempt(&mut guard, "fresh_tool", json!({ "i": 99 })) {
        GuardDecision::Reject { reason } => assert!(reason.contains("budget exhausted")),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(guard.total_calls(), 12);
}

#[test]
fn test_consecutive_repeat_breaker() {
    let mut guard = ToolCallGuard::new(GuardLimits::default());

    assert!(matches!(
        attempt(&mut guard, "read", json!({ "p": 1 })),
        GuardDecision::Allow { .. }
    ));
    assert!(matches!(
        attempt(&mut guard, "read", json!({ "p": 2 })),
        GuardDecision::Allow { .. }
    ));
    match attempt(&mut guard, "read", json!({ "p": 3 })) {
        GuardDecision::Reject { reason } => {
            assert!(reason.contains("3 times consecutively"), "{reason}")
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    // a different tool resets the streak
    assert!(matches!(
        attempt(&mut guard, "list", json!({})),
        GuardDecision::Allow { .. }
    ));
    assert!(matches!(
        attempt(&mut guard, "read", json!({ "p": 4 })),
        GuardDecision::Allow { .. }
    ));
}

#[test]
fn test_two_strikes_halts_budget() {
    let mut budget = BudgetTracker::new(BudgetLimits::default());
    let sig = signature("search", &json!({ "q": "x" }));

    assert!(budget.check_repeat(&sig, "h0").is_ok());
    assert_eq!(budget.check_repeat(&sig, "h0"), Err(NO_PROGRESS_REASON.to_string()));
    assert!(budget.is_halted());

    // any further class check reports the halt, not a quota
    let other = signature("list", &json!({}));
    assert_eq!(budget.check_repeat(&other, "h1"), Err(NO_PROGRESS_REASON.to_string()));
    assert_eq!(budget.can_call_tool("list"), Err(NO_PROGRESS_REASON.to_string()));
}

#[tokio::test]
async fn test_two_strikes_halts_turn() {
    let search = CountingTool::new("search");
    let list = CountingTool::new("list");
    let mut turn = turn_with(&[Arc::clone(&search), Arc::clone(&list)]);
    let args = json!({ "q": "same" });

    assert!(matches!(
        turn.invoke("search", &args).await,
        ToolOutcome::Executed(_)
    ));
    assert!(matches!(
        turn.invoke("search", &args).await,
        ToolOutcome::Cached(_)
    ));
    assert!(turn.is_halted());

    let third = turn.invoke("list", &json!({})).await;
    assert_eq!(third, ToolOutcome::Halted(NO_PROGRESS_REASON.to_string()));
    assert_eq!(third.to_value()["blocked"], json!(true));
    assert_eq!(turn.must_finalize().as_deref(), Some(NO_PROGRESS_REASON));
    assert_eq!(list.calls(), 0);
}

#[tokio::test]
async fn test_reset_starts_a_clean_turn() {
    let search = CountingTool::new("search");
    let mut turn = turn_with(&[Arc::clone(&search)]);
    let args = json!({ "q": "again" });

    turn.invoke("search", &args).await;
    turn.invoke("search", &args).await;
    assert!(turn.is_halted());

    turn.reset();
    assert!(!turn.is_halted());
    // the result cache outlives the turn
    assert!(matches!(
        turn.invoke("search", &args).await,
        ToolOutcome::Cached(_)
    ));
    assert_eq!(search.calls(), 1);
}

fn file_turn(root: &TempDir, cache: Arc<ResultCache>) -> TurnController {
    let workspace = Arc::new(Workspace::new(root.path()));
    let registry = ToolRegistry::empty()
        .with(Arc::new(ReadFileTool::new(Arc::clone(&workspace))))
        .with(Arc::new(WriteFileTool::new(workspace)));
    TurnController::new(
        GuardLimits::default(),
        BudgetLimits::default(),
        cache,
        Arc::new(registry),
    )
}

fn read_content(outcome: &ToolOutcome) -> Value {
    match outcome {
        ToolOutcome::Executed(output) => output.data["content"].clone(),
        other => panic!("expected a fresh read, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_after_write_across_turns_is_fresh() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.txt"), "old").unwrap();
    let cache = Arc::new(ResultCache::in_memory(1000));
    let mut turn = file_turn(&root, Arc::clone(&cache));
    let read = json!({ "path": "a.txt" });

    assert_eq!(read_content(&turn.invoke("read_file", &read).await), "old");

    turn.reset();
    let write = turn
        .invoke("write_file", &json!({ "path": "a.txt", "content": "new" }))
        .await;
    assert!(matches!(write, ToolOutcome::Executed(_)));

    turn.reset();
    assert_eq!(read_content(&turn.invoke("read_file", &read).await), "new");
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_outside_edit_between_turns_is_read_fresh() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("a.txt"), "old").unwrap();
    let mut turn = file_turn(&root, Arc::new(ResultCache::in_memory(1000)));
    let read = json!({ "path": "a.txt" });

    assert_eq!(read_content(&turn.invoke("read_file", &read).await), "old");
    std::fs::write(root.path().join("a.txt"), "new").unwrap();

    turn.reset();
    assert_eq!(read_content(&turn.invoke("read_file", &read).await), "new");
}

#[test]
fn test_cache_bound_keeps_most_recent_half() {
    let cache = ResultCache::in_memory(1000);
    for i in 0..1001 {
        cache.set(format!("fp-{i}"), json!(i));
    }

    assert_eq!(cache.len(), 500);
    assert!(!cache.contains("fp-500"));
    for i in 501..1001 {
        assert!(cache.contains(&format!("fp-{i}")), "fp-{i} evicted");
    }
}

proptest! {
    #[test]
    fn prop_cache_never_exceeds_capacity(capacity in 1usize..40, writes in 0usize..120) {
        let cache = ResultCache::in_memory(capacity);
        for i in 0..writes {
            cache.set(format!("k{i}"), json!(i));
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn prop_signature_ignores_key_order(
        fields in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
    ) {
        let render = |pairs: Vec<(&String, &i64)>| {
            let body: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", json!(k), v))
                .collect();
            format!("{{{}}}", body.join(","))
        };
        let forward: Value = serde_json::from_str(&render(fields.iter().collect())).unwrap();
        let reverse: Value = serde_json::from_str(&render(fields.iter().rev().collect())).unwrap();

        prop_assert_eq!(signature("tool", &forward), signature("tool", &reverse));
    }

    #[test]
    fn prop_guard_ceiling_holds(calls in 0usize..40) {
        let mut guard = ToolCallGuard::new(GuardLimits::default());
        let mut allowed = 0;

        for i in 0..calls {
            let tool = if i % 2 == 0 { "a" } else { "b" };
            match attempt(&mut guard, tool, json!({ "i": i })) {
                GuardDecision::Allow { .. } => allowed += 1,
                GuardDecision::Reject { reason } => {
                    prop_assert!(reason.contains("budget exhausted"));
                }
                GuardDecision::Duplicate { .. } => prop_assert!(false, "distinct calls"),
            }
        }

        prop_assert_eq!(allowed, calls.min(12));
    }
}
