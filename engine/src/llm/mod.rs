//! Model call interface
//!
//! Every backend the assistant talks to (the commander, the executor and
//! thinker models, the swarm workers) sits behind [`LLMProvider`]. Replies
//! are classified into a tool call or a final answer with
//! [`parse_tool_calls`], since the tool protocol is plain JSON in text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod anthropic;
pub mod ollama;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use retry::{generate_with_retry, RetryPolicy};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ProviderUnavailable(_)
                | LLMError::RateLimitExceeded
                | LLMError::NetworkError(_)
                | LLMError::Timeout
        )
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,

    /// Set on tool result messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn tool_result(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// Rough token estimate (4 characters per token)
    pub fn estimated_tokens(&self) -> usize {
        self.content.len().div_ceil(4)
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LLMResponse {
    /// The model wants to call a tool
    ToolCall(ToolCall),

    /// The model answered in plain text
    FinalAnswer(FinalAnswer),
}

impl LLMResponse {
    /// Classify raw model output
    pub fn from_text(content: String) -> Self {
        match parse_tool_calls(&content) {
            Some(call) => LLMResponse::ToolCall(call),
            None => LLMResponse::FinalAnswer(FinalAnswer::new(content)),
        }
    }

    /// Raw text of a final answer; tool calls render as their JSON form
    pub fn into_text(self) -> String {
        match self {
            LLMResponse::FinalAnswer(answer) => answer.content,
            LLMResponse::ToolCall(call) => call.to_json(),
        }
    }
}

/// Tool call request from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parsed arguments. Empty or blank argument strings read as `{}`.
    pub fn args(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments)
    }

    /// The call in the wire format the model is asked to emit
    pub fn to_json(&self) -> String {
        let arguments = self.args().unwrap_or(serde_json::Value::Null);
        serde_json::json!({ "function": self.name, "arguments": arguments }).to_string()
    }
}

/// Final answer from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub content: String,
}

impl FinalAnswer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "anthropic")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama), false for cloud providers
    fn is_local(&self) -> bool;

    /// Returns the estimated cost in USD for `tokens` tokens.
    /// Local providers return 0.0
    fn estimated_cost(&self, tokens: usize) -> f64;

    /// Generate a response from the LLM
    ///
    /// # Arguments
    /// * `messages` - Conversation history including system prompt, user messages, and tool results
    ///
    /// # Returns
    /// * `Ok(LLMResponse)` - Either a tool call or final answer
    /// * `Err(LLMError)` - If the request fails
    async fn generate(&self, messages: &[Message]) -> Result<LLMResponse>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

/// Parse a tool call out of model output.
///
/// Accepted shapes, tried in order:
/// 1. The whole reply is `{"function": "...", "arguments": {...}}`
/// 2. That object inside a markdown code fence
/// 3. That object embedded in surrounding prose
pub fn parse_tool_calls(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();

    if let Some(tc) = try_parse_function_json(trimmed) {
        return Some(tc);
    }

    if let Some(inner) = extract_fenced_block(trimmed) {
        if let Some(tc) = try_parse_function_json(inner.trim()) {
            return Some(tc);
        }
    }

    let pos = trimmed.find("{\"function\"")?;
    let json_str = extract_balanced_json(&trimmed[pos..])?;
    try_parse_function_json(json_str)
}

/// First JSON object found in `content`, whether bare, fenced, or embedded
/// in prose. Small models rarely emit clean JSON, so this scans every `{`.
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();
    let candidate = extract_fenced_block(trimmed).unwrap_or(trimmed);

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(candidate.trim()) {
        return Some(value);
    }

    candidate
        .match_indices('{')
        .filter_map(|(pos, _)| extract_balanced_json(&candidate[pos..]))
        .find_map(|s| match serde_json::from_str(s) {
            Ok(value @ serde_json::Value::Object(_)) => Some(value),
            _ => None,
        })
}

fn try_parse_function_json(s: &str) -> Option<ToolCall> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let function = json.get("function")?.as_str()?;
    let arguments = json
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall::new(
        format!("call_{}", uuid::Uuid::new_v4()),
        function,
        arguments.to_string(),
    ))
}

/// Body of the first markdown code fence, tolerating trailing prose.
fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // skip the language tag line
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let body_end = body_start + content[body_start..].find("```")?;

    if body_start >= body_end {
        return None;
    }
    Some(&content[body_start..body_end])
}

/// Balanced `{...}` prefix of `s`, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
