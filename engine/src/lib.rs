//! Brain Engine Library
//!
//! Agent-loop control plane (guard, budget, result cache), the commander
//! loop that uses it, and the worker swarm it can launch. Used by the
//! `brain` binary and the integration tests.

/// Agent-loop control plane
pub mod control;

/// Blackboard, workers and swarm rounds
pub mod swarm;

/// LLM provider abstraction layer
pub mod llm;

/// Built-in tools and the tool registry
pub mod tools;

/// Commander agent loop
pub mod agent;

/// Configuration management module
pub mod config;

/// Atomic JSON file persistence
pub mod persist;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
