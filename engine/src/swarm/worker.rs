//! Swarm worker
//!
//! One think-and-report cycle: show a small model the task plus a bounded
//! slice of what the hive already knows, then decode its reply into
//! discovery / solution / error fields.

use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;

use crate::llm::{extract_json_object, generate_with_retry, LLMProvider, Message, RetryPolicy};

use super::hive::{HiveEntry, HiveState, MessageKind};

/// Characters of unparsed output kept as a discovery
const FALLBACK_DISCOVERY_CHARS: usize = 100;

/// How much hive history goes into each prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptWindows {
    pub discoveries: usize,
    pub solutions: usize,
    pub errors: usize,
}

impl Default for PromptWindows {
    fn default() -> Self {
        Self {
            discoveries: 5,
            solutions: 3,
            errors: 3,
        }
    }
}

/// Decoded worker reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    /// The model answered with the requested JSON object
    Structured {
        discovery: Option<String>,
        solution: Option<String>,
        error: Option<String>,
    },

    /// Anything else; a prefix of the text stands in as a discovery
    Unparsed { discovery: String },
}

impl WorkerReply {
    pub fn discovery(&self) -> Option<&str> {
        match self {
            WorkerReply::Structured { discovery, .. } => discovery.as_deref(),
            WorkerReply::Unparsed { discovery } => Some(discovery),
        }
    }

    pub fn solution(&self) -> Option<&str> {
        match self {
            WorkerReply::Structured { solution, .. } => solution.as_deref(),
            WorkerReply::Unparsed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            WorkerReply::Structured { error, .. } => error.as_deref(),
            WorkerReply::Unparsed { .. } => None,
        }
    }

    /// Messages to broadcast, in discovery, solution, error order
    pub fn messages(&self) -> Vec<(MessageKind, &str)> {
        [
            (MessageKind::Discovery, self.discovery()),
            (MessageKind::Solution, self.solution()),
            (MessageKind::Error, self.error()),
        ]
        .into_iter()
        .filter_map(|(kind, text)| text.map(|t| (kind, t)))
        .collect()
    }
}

/// Decode raw model output. Never fails.
pub fn parse_response(text: &str) -> WorkerReply {
    if let Some(object) = extract_json_object(text) {
        return WorkerReply::Structured {
            discovery: field(&object, "discovery"),
            solution: field(&object, "solution"),
            error: field(&object, "error"),
        };
    }

    let trimmed = text.trim();
    let discovery = if trimmed.is_empty() {
        "no output".to_string()
    } else {
        trimmed.chars().take(FALLBACK_DISCOVERY_CHARS).collect()
    };
    WorkerReply::Unparsed { discovery }
}

/// Non-empty field as text. Non-string values keep their JSON form.
fn field(object: &serde_json::Value, key: &str) -> Option<String> {
    let text = match object.get(key)? {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

pub struct Worker {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    windows: PromptWindows,
}

impl Worker {
    /// `attempt_timeout` bounds each of the two attempts
    pub fn new(provider: Arc<dyn LLMProvider>, attempt_timeout: Duration) -> Self {
        Self {
            provider,
            policy: RetryPolicy::worker(attempt_timeout),
            windows: PromptWindows::default(),
        }
    }

    pub fn with_windows(mut self, windows: PromptWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask the worker model once (plus one retry) and return its raw text
    pub async fn think(
        &self,
        agent_id: &str,
        task: &str,
        hive: &HiveState,
    ) -> Result<String, EngineError> {
        let prompt = self.build_prompt(agent_id, task, hive);
        let response =
            generate_with_retry(self.provider.as_ref(), &[Message::user(prompt)], &self.policy)
                .await?;
        Ok(response.into_text())
    }

    pub fn build_prompt(&self, agent_id: &str, task: &str, hive: &HiveState) -> String {
        let sections = [
            (
                "Recent discoveries",
                hive.recent(MessageKind::Discovery, self.windows.discoveries),
            ),
            (
                "Recent solutions",
                hive.recent(MessageKind::Solution, self.windows.solutions),
            ),
            (
                "Errors to avoid",
                hive.recent(MessageKind::Error, self.windows.errors),
            ),
        ];

        let mut prompt = format!(
            "You are {} in a swarm of agents working on one task. Build on what \
             your peers found and keep it short.\n\nTASK: {}\n",
            agent_id, task
        );
        for (title, entries) in sections {
            prompt.push_str(&format!("\n{}:\n{}\n", title, render_entries(entries)));
        }
        prompt.push_str(
            "\nReference a prior finding if there is one, add one new idea, and \
             flag any gap or conflict as an error.\n\
             Reply with JSON only: \
             {\"discovery\": \"what you found\", \"solution\": \"your proposed answer\", \
             \"error\": \"problem you hit, if any\"}",
        );
        prompt
    }
}

fn render_entries(entries: &[HiveEntry]) -> String {
    if entries.is_empty() {
        return "(none)".to_string();
    }
    entries
        .iter()
        .map(|e| format!("- [{}] {}", e.agent, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_structured_reply() {
        let reply = parse_response(
            r#"Here you go: {"discovery": "loop skips last item", "solution": "off-by-one in loop", "error": ""}"#,
        );
        assert_eq!(reply.discovery(), Some("loop skips last item"));
        assert_eq!(reply.solution(), Some("off-by-one in loop"));
        assert_eq!(reply.error(), None);
    }

    #[test]
    fn test_parse_stringifies_non_string_fields() {
        let reply = parse_response(r#"{"discovery": 42, "solution": null}"#);
        assert_eq!(reply.discovery(), Some("42"));
        assert_eq!(reply.solution(), None);
    }

    #[test]
    fn test_unparsed_keeps_first_hundred_chars() {
        let text = "é".repeat(150);
        match parse_response(&text) {
            WorkerReply::Unparsed { discovery } => assert_eq!(discovery.chars().count(), 100),
            other => panic!("expected Unparsed, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_output_fallback() {
        assert_eq!(
            parse_response("   "),
            WorkerReply::Unparsed {
                discovery: "no output".to_string()
            }
        );
    }

    #[test]
    fn test_messages_order() {
        let reply = WorkerReply::Structured {
            discovery: Some("d".into()),
            solution: Some("s".into()),
            error: Some("e".into()),
        };
        let kinds: Vec<MessageKind> = reply.messages().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::Discovery, MessageKind::Solution, MessageKind::Error]
        );
    }

    #[test]
    fn test_prompt_includes_bounded_history() {
        let mut hive = HiveState {
            task: "t".into(),
            ..HiveState::default()
        };
        for i in 0..8 {
            hive.discoveries.push(HiveEntry {
                agent: format!("agent_{i}"),
                content: format!("finding-{i}"),
                timestamp: Utc::now(),
            });
        }

        let provider: Arc<dyn LLMProvider> =
            Arc::new(crate::llm::OllamaProvider::new("http://localhost:11434", "tinyllama"));
        let worker = Worker::new(provider, Duration::from_secs(1));
        let prompt = worker.build_prompt("agent_9", "find the bug", &hive);

        assert!(prompt.contains("TASK: find the bug"));
        assert!(prompt.contains("finding-7"));
        assert!(prompt.contains("finding-3"));
        assert!(!prompt.contains("finding-2"));
        assert!(prompt.contains("Errors to avoid:\n(none)"));
    }
}
