//! Anthropic Messages API provider, used for the commander model.

use super::{LLMError, LLMProvider, LLMResponse, Message, MessageRole};
use crate::config::CommanderConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    config: CommanderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// `api_key` is usually read from the environment variable named in
    /// the config; a missing key surfaces on the first call.
    pub fn new(config: CommanderConfig, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            api_key,
            client,
        }
    }

    /// Build from config, reading the key from the configured env var
    pub fn from_env(config: CommanderConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(config, api_key)
    }

    /// Split off system messages (the API takes them separately) and map the
    /// remaining roles. Tool results are sent as user turns.
    fn build_payload(&self, messages: &[Message]) -> serde_json::Value {
        let mut system_prompt = String::new();
        let mut api_messages = Vec::new();
        for msg in messages {
            if msg.role == MessageRole::System {
                if !system_prompt.is_empty() {
                    system_prompt.push('\n');
                }
                system_prompt.push_str(&msg.content);
                continue;
            }
            let role = if msg.role == MessageRole::Assistant {
                "assistant"
            } else {
                "user"
            };
            api_messages.push(json!({ "role": role, "content": msg.content }));
        }

        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system_prompt,
            "messages": api_messages,
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn estimated_cost(&self, tokens: usize) -> f64 {
        (tokens as f64 / 1000.0) * self.config.cost_per_1k_tokens
    }

    async fn check_health(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, messages: &[Message]) -> super::Result<LLMResponse> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed(format!("{} is not set", self.config.api_key_env))
        })?;

        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_payload(messages))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else if e.is_connect() {
                    LLMError::ProviderUnavailable(e.to_string())
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                500..=599 => LLMError::ProviderUnavailable(text),
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let full_content: String = content_arr
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect();

        Ok(LLMResponse::from_text(full_content))
    }
}
