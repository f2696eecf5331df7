//! Agent-loop control plane
//!
//! Bounds and memoizes the tool calls a reasoning loop makes in one user
//! turn. The guard and budget are turn-scoped; the result cache lives for
//! the whole process and is shared between turns.

pub mod budget;
pub mod cache;
pub mod guard;
pub mod signature;
pub mod turn;

pub use budget::{BudgetLimits, BudgetTracker, ResourceClass, NO_PROGRESS_REASON};
pub use cache::{CacheStats, ResultCache};
pub use guard::{GuardDecision, GuardLimits, ToolCallGuard};
pub use signature::{artifact_hash, fingerprint, result_hash, signature};
pub use turn::{ToolOutcome, TurnController, TurnStats};
