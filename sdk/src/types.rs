//! Tool input/output types

use serde::{Deserialize, Serialize};

/// Output from a tool function
///
/// `artifacts` lists durable outputs (created or edited files) the tool
/// produced. The control plane folds them into call fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl ToolOutput {
    /// Create a successful output with text
    pub fn text(text: impl Into<String>) -> Self {
        Self::json(serde_json::json!({ "text": text.into() }))
    }

    /// Create a successful output with JSON data
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            artifacts: Vec::new(),
        }
    }

    /// Create an error output
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
            artifacts: Vec::new(),
        }
    }

    /// Attach artifact identifiers produced by this call
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Convert to a JSON value
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A call declined by policy, reported back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub blocked: bool,
    pub message: String,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            blocked: true,
            message: message.into(),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "blocked": self.blocked, "message": self.message })
    }
}
