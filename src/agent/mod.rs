//! Agent module - answers questions with a tool-calling language model.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt and user question
//! 2. Call LLM with available tools
//! 3. If LLM requests tool calls, execute them and feed results back
//! 4. Repeat until LLM produces a final answer or max iterations reached
//!
//! [`AnswerPipeline`] wraps one invocation with timeout and retry and
//! coerces the result into a [`StructuredAnswer`].

mod agent_loop;
mod memory;
mod pipeline;
mod prompt;
mod retry;

pub use agent_loop::{Agent, AgentError, AgentOutput, AgentRunner};
pub use memory::{estimate_tokens, ChatMemory};
pub use pipeline::{
    coerce, AnswerPipeline, FailureKind, PipelineOutcome, PipelineResult, StructuredAnswer,
    GENERAL_ERROR_ANSWER, RETRY_EXHAUSTED_ANSWER,
};
pub use prompt::{build_system_prompt, GREETING_ANSWER, NOT_FOUND_ANSWER, REFUSAL_ANSWER};
pub use retry::{RetryError, RetryPolicy};
