//! Error types and handling
//!
//! This module provides the error types used throughout the Brain engine.
//! All errors implement the `BrainErrorExt` trait which provides a suggested
//! remedy and indicates whether errors are recoverable.
//!
//! Policy decisions (a tool call declined by the guard, a turn halted by the
//! budget) are not errors and never appear here. They travel as values
//! through the control plane.

use thiserror::Error;

/// Trait for Brain error extensions
///
/// This trait provides additional context for errors, including a suggested
/// remedy and recoverability information. All engine errors implement this trait.
pub trait BrainErrorExt {
    /// Returns a suggested remedy for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require manual intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Backend**: The model service is offline, slow or rejecting requests
/// - **Persistence**: Cache or blackboard files could not be written
/// - **Tool**: Unknown tools or failing tool executions
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, BrainErrorExt};
///
/// let error = EngineError::ServiceOffline("ollama".to_string());
/// assert!(error.user_hint().contains("ollama serve"));
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad log level".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backend errors
    #[error("Model service offline: {0}")]
    ServiceOffline(String),

    #[error("Model call timed out after {attempts} attempt(s)")]
    BackendTimeout { attempts: u32 },

    #[error("Model provider rate limited the request")]
    BackendRateLimited,

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrainErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::ServiceOffline(_) => {
                "Model service is offline. Start it with 'ollama serve' and check the base URL"
            }
            Self::BackendTimeout { .. } => {
                "The model took too long to respond. Try a smaller model or retry later"
            }
            Self::BackendRateLimited => "Rate limited by the provider. Wait a minute and retry",
            Self::LLMProvider(_) => "LLM provider rejected the request. Check API keys and model name",

            Self::Persistence(_) => "Could not write state to disk. Check the data directory",

            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::ToolError(_) => "Tool operation failed",
            Self::PathOutsideWorkspace(_) => "Operation must be within workspace",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_recoverable() {
        assert!(EngineError::ServiceOffline("x".into()).is_recoverable());
        assert!(EngineError::BackendTimeout { attempts: 3 }.is_recoverable());
        assert!(EngineError::BackendRateLimited.is_recoverable());
    }

    #[test]
    fn test_timeout_message_carries_attempts() {
        let err = EngineError::BackendTimeout { attempts: 2 };
        assert_eq!(err.to_string(), "Model call timed out after 2 attempt(s)");
        assert!(err.user_hint().contains("retry"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(err.user_hint(), "File system operation failed");
    }
}
