//! Knowledge tools available to the agent.
//!
//! Every tool wraps one external data source. Tools report failures as a
//! typed [`ToolError`]; the registry turns those into readable text at the
//! boundary so the agent loop always receives something it can reason over.

mod document;
mod search;
mod web;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::llm::{FunctionSchema, ToolSchema};

pub use document::DocumentTool;
pub use search::KnowledgeBaseTool;
pub use web::{KnowledgeApi, ListingTool, PageParams, SessionSearchTool, SortOrder};

/// Failure inside a tool. The `Display` text is what the agent sees.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Error: {0}")]
    InvalidArguments(String),

    #[error("Error: unknown tool '{0}'")]
    UnknownTool(String),

    #[error("HTTP Error: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Request Error: An error occurred while trying to reach the API. {0}")]
    Request(String),

    #[error("Error: The API did not return valid JSON. Received: {0}")]
    InvalidJson(String),

    #[error("An error occurred while trying to retrieve text chunks: {0}")]
    Retrieval(String),

    #[error("Error: could not read the knowledge document: {0}")]
    Io(String),
}

/// A capability the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// Name and description, for prompts and logs.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Fixed set of tools handed to the agent.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                tool_type: "function".to_string(),
                function: FunctionSchema {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Run a tool by name.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args).await
    }

    /// Run a tool and flatten the outcome to text. Never fails.
    pub async fn invoke(&self, name: &str, args: Value) -> String {
        tracing::info!("Tool '{}' called with args: {}", name, args_preview(&args));
        tracing::debug!("Tool '{}' full args: {}", name, args);
        match self.execute(name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                e.to_string()
            }
        }
    }
}

/// Arguments carry user query text, so info logs only see the head.
const LOGGED_ARGS_CHARS: usize = 100;

fn args_preview(args: &Value) -> String {
    let text = args.to_string();
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(LOGGED_ARGS_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Deserialize tool arguments; a missing arguments object means "all defaults".
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> Result<String, ToolError> {
            args["text"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".to_string()))
        }
    }

    #[tokio::test]
    async fn invoke_returns_output_or_error_text() {
        let registry = ToolRegistry::new().with(Arc::new(Echo));

        assert_eq!(registry.invoke("echo", json!({"text": "hi"})).await, "hi");
        assert_eq!(
            registry.invoke("echo", json!({})).await,
            "Error: Missing 'text' argument"
        );
        assert_eq!(
            registry.invoke("nope", Value::Null).await,
            "Error: unknown tool 'nope'"
        );
    }

    #[test]
    fn schemas_are_function_tools() {
        let registry = ToolRegistry::new().with(Arc::new(Echo)).with(Arc::new(Echo));
        assert_eq!(registry.len(), 1);

        let schemas = registry.get_tool_schemas();
        let value = serde_json::to_value(&schemas).unwrap();
        assert_eq!(value[0]["type"], "function");
        assert_eq!(value[0]["function"]["name"], "echo");
        assert_eq!(value[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn logged_args_are_cut_short() {
        assert_eq!(args_preview(&json!({"page": 1})), r#"{"page":1}"#);

        let long = json!({"query_text": "robots ".repeat(40)});
        let shown = args_preview(&long);
        assert_eq!(shown.chars().count(), LOGGED_ARGS_CHARS + 3);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn http_error_text_matches_upstream_format() {
        let err = ToolError::Http {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP Error: 404 - not found");
    }
}
