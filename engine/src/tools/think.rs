//! `deep_think`: hand a hard question to the slower reasoning model.
//!
//! Charged against the thinker budget class by name (see `[budget]
//! thinker_tools` in the config).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use sdk::{EngineError, ToolOutput};

use crate::llm::{generate_with_retry, LLMProvider, Message, RetryPolicy};

use super::Tool;

const THINKER_SYSTEM_PROMPT: &str = "You are a careful reasoning engine. Work through the \
question step by step, state assumptions, and finish with a short conclusion. \
Do not call tools.";

pub struct DeepThinkTool {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
}

impl DeepThinkTool {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }
}

#[async_trait]
impl Tool for DeepThinkTool {
    fn name(&self) -> &str {
        "deep_think"
    }

    fn description(&self) -> &str {
        "Reason through a hard question with a slower, stronger model. Expensive; use sparingly."
    }

    fn usage(&self) -> &str {
        r#"{"question": "what to reason about", "context": "optional background"}"#
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                EngineError::ToolError("missing required argument 'question'".to_string())
            })?;

        let mut prompt = question.to_string();
        if let Some(context) = args.get("context").and_then(Value::as_str) {
            prompt = format!("{}\n\nContext:\n{}", question, context);
        }

        let messages = [Message::system(THINKER_SYSTEM_PROMPT), Message::user(prompt)];
        let response = generate_with_retry(self.provider.as_ref(), &messages, &self.policy).await?;

        Ok(ToolOutput::json(json!({
            "model": self.provider.name(),
            "thoughts": response.into_text(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinalAnswer, LLMResponse};

    struct Echo;

    #[async_trait]
    impl LLMProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn estimated_cost(&self, _tokens: usize) -> f64 {
            0.0
        }
        async fn generate(&self, messages: &[Message]) -> crate::llm::Result<LLMResponse> {
            Ok(LLMResponse::FinalAnswer(FinalAnswer::new(
                messages[1].content.clone(),
            )))
        }
    }

    #[tokio::test]
    async fn test_question_and_context_reach_the_model() {
        let tool = DeepThinkTool::new(Arc::new(Echo), RetryPolicy::default());
        let out = tool
            .execute(&json!({"question": "why?", "context": "because"}))
            .await
            .unwrap();
        assert_eq!(out.data["thoughts"], "why?\n\nContext:\nbecause");
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let tool = DeepThinkTool::new(Arc::new(Echo), RetryPolicy::default());
        assert!(tool.execute(&json!({"question": " "})).await.is_err());
    }
}
