//! Retrieval-augmented answer pipeline.
//!
//! Wraps an [`AgentRunner`] with the retry policy and normalizes whatever
//! comes back into a [`StructuredAnswer`]. Every path ends in an answer; the
//! pipeline never hands an error to its caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::agent_loop::{AgentError, AgentOutput, AgentRunner};
use super::retry::{RetryError, RetryPolicy};

/// Answer when every attempt failed with a transient error.
pub const RETRY_EXHAUSTED_ANSWER: &str =
    "I'm having trouble processing your request after multiple attempts. Please try again later.";

/// Answer for any other failure.
pub const GENERAL_ERROR_ANSWER: &str =
    "I encountered an error while processing your request. Please try again or contact support.";

/// The fixed response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub answer: String,
}

impl StructuredAnswer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RetriesExhausted,
    General,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The agent produced the required shape directly.
    Success,
    /// The shape had to be recovered from raw text, or the raw text was used.
    Degraded,
    /// The fixed apology was returned.
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub answer: StructuredAnswer,
    pub outcome: PipelineOutcome,
    pub attempts: u32,
}

pub struct AnswerPipeline {
    runner: Arc<dyn AgentRunner>,
    policy: RetryPolicy,
}

impl AnswerPipeline {
    pub fn new(runner: Arc<dyn AgentRunner>, policy: RetryPolicy) -> Self {
        Self { runner, policy }
    }

    pub async fn answer(&self, query: &str) -> StructuredAnswer {
        self.run(query).await.answer
    }

    pub async fn run(&self, query: &str) -> PipelineResult {
        let mut attempts = 0;
        let result = self
            .policy
            .run(
                |attempt| {
                    attempts = attempt + 1;
                    if attempt > 0 {
                        tracing::info!("Retrying agent invocation (attempt {})", attempt + 1);
                    }
                    self.runner.run(query)
                },
                AgentError::is_transient,
            )
            .await;

        let (answer, outcome) = match result {
            Ok(output) => coerce(output),
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!("Agent failed after {} attempts: {}", attempts, last);
                failed(FailureKind::RetriesExhausted)
            }
            Err(RetryError::Fatal { error, .. }) => {
                tracing::error!("Agent failed with non-retryable error: {}", error);
                failed(FailureKind::General)
            }
        };

        tracing::info!(?outcome, attempts, "Pipeline finished");
        PipelineResult {
            answer,
            outcome,
            attempts,
        }
    }
}

fn failed(kind: FailureKind) -> (StructuredAnswer, PipelineOutcome) {
    let text = match kind {
        FailureKind::RetriesExhausted => RETRY_EXHAUSTED_ANSWER,
        FailureKind::General => GENERAL_ERROR_ANSWER,
    };
    (StructuredAnswer::new(text), PipelineOutcome::Failed(kind))
}

/// Normalize agent output into the response shape.
///
/// Order: the agent's own parsed answer, then an answer object recovered
/// from the raw text (code fences or surrounding prose stripped), then the
/// raw text verbatim. Blank answers never count as a match.
pub fn coerce(output: AgentOutput) -> (StructuredAnswer, PipelineOutcome) {
    if let Some(structured) = output.structured {
        if !structured.answer.trim().is_empty() {
            return (structured, PipelineOutcome::Success);
        }
    }

    if let Some(recovered) = extract_answer(&output.raw) {
        tracing::warn!("Agent output did not match the answer shape; recovered it from raw text");
        return (recovered, PipelineOutcome::Degraded);
    }

    if output.raw.trim().is_empty() {
        return failed(FailureKind::General);
    }

    tracing::warn!("Agent output is not an answer object; returning raw text");
    (StructuredAnswer::new(output.raw), PipelineOutcome::Degraded)
}

fn extract_answer(raw: &str) -> Option<StructuredAnswer> {
    let trimmed = raw.trim();
    let candidates = [
        Some(trimmed),
        strip_code_fence(trimmed),
        outermost_object(trimmed),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(|text| serde_json::from_str::<StructuredAnswer>(text).ok())
        .find(|parsed| !parsed.answer.trim().is_empty())
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?.strip_suffix("```")?;
    let body = body.strip_prefix("json").unwrap_or(body);
    Some(body.trim())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
