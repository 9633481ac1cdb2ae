//! OpenAI Compatible Client
//!
//! Supports OpenAI API and any OpenAI-compatible API (custom endpoints,
//! local models, etc.), including function-style tool calls

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    ChatMessage, ChatOptions, ChatResponse, Provider, ProviderError, ProviderInfo, TokenUsage,
    ToolCall, ToolSpec,
};

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Result<Self, ProviderError> {
        let base_url = base_url.unwrap_or("https://api.openai.com/v1");

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.to_string(),
        })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> serde_json::Value {
        let chat: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": chat,
            "temperature": options.temperature.unwrap_or(0.7),
            "max_tokens": options.max_tokens.unwrap_or(4096),
        });

        if !tools.is_empty() {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }

    async fn send(&self, body: serde_json::Value) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let response: OpenAIResponse = response.json().await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::APIError("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                // Arguments arrive as a JSON-encoded string
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::String(call.function.arguments));
                ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            model: response.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl Provider for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
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
        ProviderInfo {
            name: self.name().to_string(),
            model: self.model.clone(),
            context_window: 128000,
            max_tokens: 16384,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: Option<OpenAIUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: Option<String>,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAIClient::new("test-key", "gpt-4o", None);
        assert!(client.is_ok());

        let client = client.unwrap();
        assert_eq!(client.name(), "openai");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_custom_base_url() {
        let client = OpenAIClient::new("test-key", "gpt-4o", Some("http://localhost:8080/v1")).unwrap();
        assert!(client.base_url.contains("localhost:8080"));
    }

    #[test]
    fn test_tools_use_function_wrapper() {
        let client = OpenAIClient::new("test-key", "gpt-4o", None).unwrap();
        let tools = vec![ToolSpec::new(
            "record_classification",
            "Record the classification result",
            serde_json::json!({ "type": "object" }),
        )];
        let body = client.request_body(&[ChatMessage::user("hi")], &tools, &ChatOptions::default());

        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "record_classification");
    }

    #[test]
    fn test_tool_call_arguments_parse_from_string() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {
                            "name": "record_classification",
                            "arguments": "{\"label\":\"invoice\"}"
                        }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 80, "completion_tokens": 12 },
            "model": "gpt-4o"
        });

        let parsed: OpenAIResponse = serde_json::from_value(raw).unwrap();
        let call = &parsed.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "record_classification");

        let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments).unwrap();
        assert_eq!(arguments["label"], "invoice");
    }
}
