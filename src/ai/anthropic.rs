//! Anthropic Claude Client
//!
//! Supports Claude Messages API (Anthropic), including tool use

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    ChatMessage, ChatOptions, ChatResponse, ChatRole, Provider, ProviderError, ProviderInfo,
    TokenUsage, ToolCall, ToolSpec,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> serde_json::Value {
        // System messages go into the top-level `system` field
        let system = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let chat: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": chat,
            "max_tokens": options.max_tokens.unwrap_or(4096),
        });

        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }
        if let Some(temp) = options.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if !tools.is_empty() {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }

    async fn send(&self, body: serde_json::Value) -> Result<ChatResponse, ProviderError> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited(text));
            }
            return Err(ProviderError::APIError(format!(
                "Status {}: {}",
                status, text
            )));
        }

        let response: AnthropicResponse = response.json().await?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        for block in response.content {
            match block {
                AnthropicBlock::Text { text } => text_parts.push(text),
                AnthropicBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id: Some(id),
                    name,
                    arguments: input,
                }),
                AnthropicBlock::Unknown => {}
            }
        }

        Ok(ChatResponse {
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            tool_calls,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            model: response.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        self.send(self.request_body(messages, &[], options)).await
    }

    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        self.send(self.request_body(messages, tools, options)).await
    }

    fn info(&self) -> ProviderInfo {
        // All current Claude models support 200k context
        ProviderInfo {
            name: self.name().to_string(),
            model: self.model.clone(),
            context_window: 200000,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    usage: Option<AnthropicUsage>,
    model: Option<String>,
    #[serde(rename = "stop_reason")]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AnthropicClient::new("test-key", "claude-sonnet-4-20250514");
        assert!(client.is_ok());

        let client = client.unwrap();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_system_messages_lift_to_top_level() {
        let client = AnthropicClient::new("test-key", "claude-sonnet-4-20250514").unwrap();
        let messages = vec![
            ChatMessage::system("You are a precise classifier."),
            ChatMessage::user("classify this"),
        ];
        let body = client.request_body(&messages, &[], &ChatOptions::default());

        assert_eq!(body["system"], "You are a precise classifier.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_tools_serialize_with_input_schema() {
        let client = AnthropicClient::new("test-key", "claude-sonnet-4-20250514").unwrap();
        let tools = vec![ToolSpec::new(
            "record_classification",
            "Record the classification result",
            serde_json::json!({ "type": "object", "properties": { "label": { "type": "string" } } }),
        )];
        let body = client.request_body(&[ChatMessage::user("hi")], &tools, &ChatOptions::default());

        assert_eq!(body["tools"][0]["name"], "record_classification");
        assert!(body["tools"][0]["input_schema"]["properties"]["label"].is_object());
    }

    #[test]
    fn test_response_blocks_parse() {
        let raw = serde_json::json!({
            "content": [
                { "type": "text", "text": "Looking at the document..." },
                { "type": "tool_use", "id": "tu_1", "name": "record_classification",
                  "input": { "label": "invoice" } }
            ],
            "usage": { "input_tokens": 120, "output_tokens": 40 },
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use"
        });

        let parsed: AnthropicResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert!(matches!(parsed.content[1], AnthropicBlock::ToolUse { .. }));
        assert_eq!(parsed.usage.unwrap().input_tokens, 120);
    }
}
