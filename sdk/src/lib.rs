//! Brain SDK
//!
//! Shared types for the Brain engine and the tools it dispatches.

/// Error types and handling
pub mod errors;

/// Tool input/output types
pub mod types;

// Re-export commonly used types
pub use errors::{BrainErrorExt, EngineError};
pub use types::{Rejection, ToolOutput};
