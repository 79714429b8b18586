//! Token-capped conversation memory for one agent invocation.

use crate::llm::{ChatMessage, Role};

/// Per-message overhead added to the character estimate.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Rough token estimate: ~4 characters per token.
pub fn estimate_tokens(message: &ChatMessage) -> usize {
    let mut chars = message.content.as_deref().map(str::len).unwrap_or(0);
    if let Some(calls) = &message.tool_calls {
        chars += calls
            .iter()
            .map(|c| c.function.name.len() + c.function.arguments.len())
            .sum::<usize>();
    }
    chars.div_ceil(4) + MESSAGE_OVERHEAD_TOKENS
}

/// System prompt and user question are pinned; tool exchanges after them
/// are dropped oldest-first once the estimate exceeds the cap. The newest
/// exchange is always kept so the model sees the latest tool output.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    token_limit: usize,
    pinned: Vec<ChatMessage>,
    /// Each entry is one assistant turn plus the tool results answering it.
    exchanges: Vec<Vec<ChatMessage>>,
}

impl ChatMemory {
    pub fn new(system_prompt: impl Into<String>, query: impl Into<String>, token_limit: usize) -> Self {
        Self {
            token_limit,
            pinned: vec![ChatMessage::system(system_prompt), ChatMessage::user(query)],
            exchanges: Vec::new(),
        }
    }

    /// Record an assistant tool-call turn together with its results.
    pub fn push_exchange(&mut self, assistant: ChatMessage, mut results: Vec<ChatMessage>) {
        let max_chars = self.max_tool_result_chars();
        for result in results.iter_mut().filter(|m| m.role == Role::Tool) {
            if let Some(content) = result.content.as_mut() {
                truncate_in_place(content, max_chars);
            }
        }

        let mut exchange = Vec::with_capacity(results.len() + 1);
        exchange.push(assistant);
        exchange.extend(results);
        self.exchanges.push(exchange);
        self.trim();
    }

    /// Messages to send, in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.pinned
            .iter()
            .chain(self.exchanges.iter().flatten())
            .cloned()
            .collect()
    }

    pub fn token_estimate(&self) -> usize {
        self.pinned
            .iter()
            .chain(self.exchanges.iter().flatten())
            .map(estimate_tokens)
            .sum()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    fn trim(&mut self) {
        while self.exchanges.len() > 1 && self.token_estimate() > self.token_limit {
            self.exchanges.remove(0);
            tracing::debug!(
                "Dropped oldest tool exchange from memory (limit {} tokens)",
                self.token_limit
            );
        }
    }

    /// A single tool result may use at most half of the budget.
    fn max_tool_result_chars(&self) -> usize {
        (self.token_limit * 4 / 2).max(256)
    }
}

fn truncate_in_place(content: &mut String, max_chars: usize) {
    if content.len() <= max_chars {
        return;
    }
    let mut end = max_chars;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
    content.push_str("\n... [truncated]");
}
