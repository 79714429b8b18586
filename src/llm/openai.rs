//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ChatMessage, ChatResponse, FunctionCall, LlmClient, LlmError, ToolCall, ToolSchema,
};
use crate::config::LlmConfig;

/// Client for any endpoint implementing `POST {base_url}/chat/completions`.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    completions_url: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            completions_url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Some providers omit the call id; one is synthesized so tool results can be matched.
#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: FunctionCall,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            tools: tools.filter(|t| !t.is_empty()),
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        parse_completion(&body)
    }
}

fn parse_completion(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;

    let tool_calls = message.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|c| ToolCall {
                id: c
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                call_type: "function".to_string(),
                function: c.function,
            })
            .collect::<Vec<_>>()
    });

    Ok(ChatResponse {
        content: message.content,
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_answer() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"answer\":\"Hi\"}"}}]}"#;
        let response = parse_completion(body).unwrap();
        assert_eq!(response.content.as_deref(), Some(r#"{"answer":"Hi"}"#));
        assert!(response.tool_calls.is_none());
    }

    #[test]
    fn parses_tool_calls_and_fills_missing_ids() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"abc","type":"function","function":{"name":"get_zones","arguments":"{\"page\":2}"}},
            {"type":"function","function":{"name":"get_latest_sessions","arguments":"{}"}}
        ]}}]}"#;
        let response = parse_completion(body).unwrap();
        let calls = response.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "abc");
        assert_eq!(calls[0].function.arguments, r#"{"page":2}"#);
        assert!(calls[1].id.starts_with("call_"));
    }

    #[test]
    fn empty_choices_is_decode_error() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(
            parse_completion("<html>bad gateway</html>").unwrap_err(),
            LlmError::Decode(_)
        ));
    }
}
