//! Conversation history for the commander loop
//!
//! Bounded by message count. The system prompt, when present, is pinned at
//! the front and never evicted; beyond that the oldest messages go first,
//! and eviction never leaves an assistant message at the head of the window.

use crate::llm::{Message, MessageRole};

/// Default number of messages kept, system prompt excluded
pub const DEFAULT_MAX_MESSAGES: usize = 30;

/// Default cap on a tool result fed back to the model, in characters
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct Conversation {
    system: Option<Message>,
    messages: Vec<Message>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(max_messages: usize) -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            max_messages: max_messages.max(2),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system = Some(Message::system(prompt));
        self
    }

    pub fn push(&mut self, message: Message) {
        if message.role == MessageRole::System && self.system.is_none() {
            self.system = Some(message);
            return;
        }
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
            // the retained history must not open on an assistant message
            let orphans = self
                .messages
                .iter()
                .take_while(|m| m.role == MessageRole::Assistant)
                .count();
            self.messages.drain(..orphans);
        }
    }

    /// System prompt followed by the retained history
    pub fn messages(&self) -> Vec<Message> {
        self.system
            .iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    /// Like [`messages`](Self::messages) with `note` appended as a system message
    pub fn messages_with_note(&self, note: impl Into<String>) -> Vec<Message> {
        let mut messages = self.messages();
        messages.push(Message::system(note));
        messages
    }

    /// Number of retained messages, system prompt excluded
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop history, keeping the system prompt
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}... [truncated]", &text[..cut]),
    }
}
