//! Core agent loop implementation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::error::Elapsed;

use crate::config::AgentConfig;
use crate::llm::{ChatMessage, LlmClient, LlmError, ToolCall};
use crate::tools::{ToolError, ToolRegistry};

use super::memory::ChatMemory;
use super::pipeline::StructuredAnswer;
use super::prompt::build_system_prompt;

/// Why one agent invocation failed.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Agent invocation timed out")]
    Timeout,

    #[error("LLM returned empty response")]
    EmptyResponse,

    #[error("Max iterations ({0}) reached without completion")]
    MaxIterations(usize),
}

impl AgentError {
    /// Only connectivity problems and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_transient(),
            Self::Timeout => true,
            Self::EmptyResponse | Self::MaxIterations(_) => false,
        }
    }
}

impl From<Elapsed> for AgentError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

/// Final assistant text, plus its parsed form when it already has the
/// required `{"answer": ...}` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub raw: String,
    pub structured: Option<StructuredAnswer>,
}

impl AgentOutput {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let structured = serde_json::from_str::<StructuredAnswer>(raw.trim()).ok();
        Self { raw, structured }
    }
}

/// Something that can answer one question end to end.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, query: &str) -> Result<AgentOutput, AgentError>;
}

/// Tool-calling agent over a chat-completion model.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: usize,
    memory_token_limit: usize,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, config: &AgentConfig) -> Self {
        let system_prompt = build_system_prompt(&tools);
        Self {
            llm,
            tools,
            system_prompt,
            max_iterations: config.max_iterations,
            memory_token_limit: config.memory_token_limit,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    async fn execute_tool_call(&self, tool_call: &ToolCall) -> ChatMessage {
        let name = &tool_call.function.name;
        let output = match parse_arguments(name, &tool_call.function.arguments) {
            Ok(args) => self.tools.invoke(name, args).await,
            Err(e) => {
                tracing::warn!("Tool '{}' not run: {}", name, e);
                e.to_string()
            }
        };
        tracing::debug!(
            "Tool '{}' returned: {}",
            tool_call.function.name,
            truncate_for_log(&output, 1000)
        );
        ChatMessage::tool_result(tool_call.id.clone(), output)
    }
}

#[async_trait]
impl AgentRunner for Agent {
    async fn run(&self, query: &str) -> Result<AgentOutput, AgentError> {
        let mut memory = ChatMemory::new(self.system_prompt.clone(), query, self.memory_token_limit);
        let tool_schemas = self.tools.get_tool_schemas();

        for iteration in 0..self.max_iterations {
            tracing::debug!("Agent iteration {}", iteration + 1);

            let messages = memory.messages();
            let response = self
                .llm
                .chat_completion(&messages, Some(&tool_schemas))
                .await?;

            match response.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    let mut results = Vec::with_capacity(tool_calls.len());
                    for tool_call in &tool_calls {
                        results.push(self.execute_tool_call(tool_call).await);
                    }
                    memory.push_exchange(
                        ChatMessage::assistant_tool_calls(response.content, tool_calls),
                        results,
                    );
                }
                _ => {
                    return match response.content {
                        Some(content) if !content.trim().is_empty() => {
                            tracing::debug!("Agent response: {}", truncate_for_log(&content, 2000));
                            Ok(AgentOutput::from_raw(content))
                        }
                        _ => Err(AgentError::EmptyResponse),
                    };
                }
            }
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }
}

/// Decode the model's argument string. Blank means "no arguments".
fn parse_arguments(name: &str, raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid arguments for tool '{}': {}", name, e)))
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::llm::{ChatResponse, FunctionCall, ToolSchema};

    /// LLM that replays a fixed script and records what it was sent.
    pub struct ScriptedLlm {
        script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        pub fn new(script: Vec<Result<ChatResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[ToolSchema]>,
        ) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatResponse::default()))
        }
    }

    pub fn text(content: &str) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
        })
    }

    pub fn call(id: &str, name: &str, arguments: &str) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::llm::Role;
    use crate::tools::Tool;
    use serde_json::{json, Value};

    struct Zones;

    #[async_trait]
    impl Tool for Zones {
        fn name(&self) -> &str {
            "get_zones"
        }

        fn description(&self) -> &str {
            "List exhibition zones"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok(r#"{"zones": ["Robotics", "Space"]}"#.to_string())
        }
    }

    fn config(max_iterations: usize) -> AgentConfig {
        AgentConfig {
            max_iterations,
            ..AgentConfig::default()
        }
    }

    fn agent(llm: Arc<ScriptedLlm>, max_iterations: usize) -> Agent {
        let tools = ToolRegistry::new().with(Arc::new(Zones));
        Agent::new(llm, tools, &config(max_iterations))
    }

    #[tokio::test]
    async fn feeds_tool_output_back_before_answering() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            call("c1", "get_zones", "{}"),
            text(r#"{"answer": "There are two zones: Robotics and Space."}"#),
        ]));
        let output = agent(llm.clone(), 5).run("Which zones exist?").await.unwrap();

        assert_eq!(
            output.structured.unwrap().answer,
            "There are two zones: Robotics and Space."
        );

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let second = &seen[1];
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[1].content.as_deref(), Some("Which zones exist?"));
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_msg.content.as_deref().unwrap().contains("Robotics"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_become_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            call("c1", "get_weather", "not json"),
            text("plain answer"),
        ]));
        let output = agent(llm.clone(), 5).run("q").await.unwrap();

        assert_eq!(output.raw, "plain answer");
        assert!(output.structured.is_none());
        let seen = llm.seen.lock().unwrap();
        assert_eq!(
            seen[1].last().unwrap().content.as_deref(),
            Some("Error: unknown tool 'get_weather'")
        );
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_not_defaulted() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            call("c1", "get_zones", r#"{"page": 3, "sortOrder": "asc""#),
            call("c2", "get_zones", ""),
            text("done"),
        ]));
        agent(llm.clone(), 5).run("q").await.unwrap();

        let seen = llm.seen.lock().unwrap();
        let rejected = seen[1].last().unwrap().content.as_deref().unwrap();
        assert!(rejected.starts_with("Error: invalid arguments for tool 'get_zones'"));
        assert!(!rejected.contains("Robotics"));

        let blank = seen[2].last().unwrap().content.as_deref().unwrap();
        assert!(blank.contains("Robotics"));
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            call("c1", "get_zones", "{}"),
            call("c2", "get_zones", "{}"),
            call("c3", "get_zones", "{}"),
        ]));
        let err = agent(llm, 2).run("q").await.err().unwrap();
        assert!(matches!(err, AgentError::MaxIterations(2)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![text("   ")]));
        let err = agent(llm, 3).run("q").await.err().unwrap();
        assert!(matches!(err, AgentError::EmptyResponse));
    }

    #[tokio::test]
    async fn provider_errors_keep_their_classification() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Connect("refused".into()))]));
        let err = agent(llm, 3).run("q").await.err().unwrap();
        assert!(err.is_transient());

        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Status {
            status: 400,
            body: "bad request".into(),
        })]));
        let err = agent(llm, 3).run("q").await.err().unwrap();
        assert!(!err.is_transient());
    }
}
