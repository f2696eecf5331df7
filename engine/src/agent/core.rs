//! Agent Core
//!
//! The commander loop. One call to [`AgentCore::process_turn`] handles one
//! user message:
//!
//! 1. Ask the commander model for the next step
//! 2. If it requests a tool, run it through the turn's [`TurnController`]
//!    and feed the (truncated) outcome back
//! 3. If it answers in plain text, that is the result
//!
//! When the controller halts or runs out of budget, or the iteration cap is
//! reached, the model gets one last call with a system note saying tools are
//! off, and whatever it says becomes the answer.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use sdk::Rejection;

use crate::control::{
    BudgetLimits, GuardLimits, ResultCache, ToolOutcome, TurnController, TurnStats,
};
use crate::llm::{generate_with_retry, LLMProvider, LLMResponse, Message, RetryPolicy};
use crate::tools::ToolRegistry;

use super::conversation::{
    truncate_chars, Conversation, DEFAULT_MAX_MESSAGES, DEFAULT_MAX_TOOL_RESULT_CHARS,
};
use super::usage::UsageTracker;

/// Maximum model calls per turn before the answer is forced
const MAX_ITERATIONS: usize = 20;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub guard: GuardLimits,
    pub budget: BudgetLimits,
    pub max_iterations: usize,
    pub max_history: usize,
    pub max_tool_result_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            guard: GuardLimits::default(),
            budget: BudgetLimits::default(),
            max_iterations: MAX_ITERATIONS,
            max_history: DEFAULT_MAX_MESSAGES,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
            retry: RetryPolicy::commander(),
        }
    }
}

/// Outcome of one user turn
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub answer: String,

    /// Model calls made, including a forced final call
    pub iterations: usize,

    /// Why tools were cut off, when the answer was forced
    pub forced_reason: Option<String>,

    pub stats: TurnStats,
    pub duration_ms: u64,
}

pub struct AgentCore {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    cache: Arc<ResultCache>,
    settings: AgentSettings,
    conversation: Conversation,
    usage: UsageTracker,
}

impl AgentCore {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        cache: Arc<ResultCache>,
        settings: AgentSettings,
    ) -> Self {
        let conversation =
            Conversation::new(settings.max_history).with_system_prompt(tools.system_prompt());
        Self {
            provider,
            tools,
            cache,
            settings,
            conversation,
            usage: UsageTracker::new(),
        }
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Forget the chat history
    pub fn clear_history(&mut self) {
        self.conversation.clear();
    }

    /// Run one user turn to a final answer
    pub async fn process_turn(&mut self, input: &str) -> Result<TurnResult> {
        let start = Instant::now();
        let mut turn = TurnController::new(
            self.settings.guard,
            self.settings.budget.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.tools),
        );
        self.conversation.push(Message::user(input));
        info!("Turn started: {}", input);

        let mut iterations = 0;
        let forced_reason = loop {
            if let Some(reason) = turn.must_finalize() {
                break reason;
            }
            if iterations >= self.settings.max_iterations {
                warn!("Turn hit the {} iteration cap", self.settings.max_iterations);
                break format!("iteration limit of {} reached", self.settings.max_iterations);
            }
            iterations += 1;

            let messages = self.conversation.messages();
            let response = self
                .call_model(&messages)
                .await
                .context("Commander model call failed")?;

            let call = match response {
                LLMResponse::FinalAnswer(answer) => {
                    self.conversation.push(Message::assistant(answer.content.clone()));
                    return Ok(self.finish(answer.content, iterations, None, &turn, start));
                }
                LLMResponse::ToolCall(call) => call,
            };

            debug!("Iteration {}: tool call {} ({})", iterations, call.name, call.id);
            self.conversation.push(Message::assistant(call.to_json()));

            let outcome = match call.args() {
                Ok(args) => turn.invoke(&call.name, &args).await,
                Err(e) => ToolOutcome::Blocked(Rejection::new(format!(
                    "arguments for {} are not valid JSON: {}",
                    call.name, e
                ))),
            };
            let result = truncate_chars(
                &outcome.to_value().to_string(),
                self.settings.max_tool_result_chars,
            );
            self.conversation.push(Message::tool_result(result, call.id));
        };

        info!("Forcing final answer: {}", forced_reason);
        let note = format!(
            "Tool access is now disabled ({}). Do not request any tools. Reply in plain \
             text with your best final answer using what you have gathered so far.",
            forced_reason
        );
        let messages = self.conversation.messages_with_note(note);
        let response = self
            .call_model(&messages)
            .await
            .context("Final commander call failed")?;
        iterations += 1;

        let answer = match response {
            LLMResponse::FinalAnswer(answer) => answer.content,
            LLMResponse::ToolCall(call) => {
                warn!("Model requested '{}' after tools were disabled", call.name);
                format!(
                    "I had to stop before finishing ({}), and no final answer was produced.",
                    forced_reason
                )
            }
        };
        self.conversation.push(Message::assistant(answer.clone()));

        Ok(self.finish(answer, iterations, Some(forced_reason), &turn, start))
    }

    async fn call_model(&mut self, messages: &[Message]) -> Result<LLMResponse> {
        let response =
            generate_with_retry(self.provider.as_ref(), messages, &self.settings.retry).await?;
        let output = match &response {
            LLMResponse::FinalAnswer(answer) => answer.content.clone(),
            LLMResponse::ToolCall(call) => call.to_json(),
        };
        self.usage.record(self.provider.as_ref(), messages, &output);
        Ok(response)
    }

    fn finish(
        &self,
        answer: String,
        iterations: usize,
        forced_reason: Option<String>,
        turn: &TurnController,
        start: Instant,
    ) -> TurnResult {
        let stats = turn.stats();
        info!(
            "Turn finished after {} model call(s): {} executed, {} cached, {} blocked",
            iterations, stats.executed, stats.cached, stats.blocked
        );
        TurnResult {
            answer,
            iterations,
            forced_reason,
            stats,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
