//! Session usage accounting
//!
//! Token counts are estimates (4 characters per token); cost comes from
//! [`LLMProvider::estimated_cost`](crate::llm::LLMProvider::estimated_cost).

use serde::Serialize;

use crate::llm::{LLMProvider, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageTracker {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one model call
    pub fn record(&mut self, provider: &dyn LLMProvider, input: &[Message], output: &str) {
        let input_tokens: usize = input.iter().map(Message::estimated_tokens).sum();
        let output_tokens = output.len().div_ceil(4);

        self.calls += 1;
        self.input_tokens += input_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.cost_usd += provider.estimated_cost(input_tokens + output_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// One-line report
    pub fn summary(&self) -> String {
        format!(
            "{} model call(s), ~{} tokens in / ~{} out, est. ${:.4}",
            self.calls, self.input_tokens, self.output_tokens, self.cost_usd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OllamaProvider;

    #[test]
    fn test_record_accumulates() {
        let provider = OllamaProvider::new("http://localhost:11434", "m");
        let mut usage = UsageTracker::new();
        usage.record(&provider, &[Message::user("abcdefgh")], "abcd");
        usage.record(&provider, &[Message::user("abcd")], "");

        assert_eq!(usage.calls, 2);
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 1);
        assert_eq!(usage.total_tokens(), 4);
        assert_eq!(usage.cost_usd, 0.0);
        assert!(usage.summary().starts_with("2 model call(s)"));
    }
}
