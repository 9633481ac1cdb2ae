//! AI client with automatic provider fallback
//!
//! Wraps a primary [`Provider`] with an optional fallback constructed
//! eagerly from "the other" provider type. Every call attempt on either
//! leg, success or failure, emits a [`UsageRecord`]. A primary failure
//! retries once on the fallback with identical arguments; when both
//! fail, the fallback's error is the one that propagates.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::usage::{self, UsageRecord, UsageSink};
use super::{
    ChatMessage, ChatOptions, ChatResponse, Provider, ProviderError, ProviderFactory, ProviderKind,
    ToolSpec,
};

#[derive(Debug, Clone)]
pub struct AiClientConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    /// Explicit fallback credentials; when absent the conventional
    /// environment variable for the fallback provider is consulted
    pub fallback_api_key: Option<String>,
    pub fallback_model: Option<String>,
}

impl AiClientConfig {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: None,
            max_tokens: None,
            fallback_api_key: None,
            fallback_model: None,
        }
    }
}

pub struct AiClient {
    primary: Arc<dyn Provider>,
    fallback: Option<Arc<dyn Provider>>,
    options: ChatOptions,
    usage_sink: Option<UsageSink>,
}

impl AiClient {
    /// Build a client from configuration. Missing primary credentials
    /// are a construction failure; missing fallback credentials merely
    /// disable the fallback.
    pub fn new(config: AiClientConfig) -> Result<Self, ProviderError> {
        let primary =
            ProviderFactory::create(config.provider, Some(&config.api_key), config.model.as_deref())?;

        let fallback_kind = config.provider.other();
        let fallback_key = config
            .fallback_api_key
            .clone()
            .or_else(|| fallback_kind.env_api_key());

        let fallback = match fallback_key {
            Some(key) => {
                match ProviderFactory::create(
                    fallback_kind,
                    Some(&key),
                    config.fallback_model.as_deref(),
                ) {
                    Ok(provider) => {
                        info!(provider = %fallback_kind, "fallback provider configured");
                        Some(provider)
                    }
                    Err(e) => {
                        debug!(provider = %fallback_kind, "fallback provider unavailable: {e}");
                        None
                    }
                }
            }
            None => {
                debug!(provider = %fallback_kind, "no fallback credentials; fallback disabled");
                None
            }
        };

        let mut options = ChatOptions::default();
        if let Some(max_tokens) = config.max_tokens {
            options.max_tokens = Some(max_tokens);
        }

        Ok(Self {
            primary,
            fallback,
            options,
            usage_sink: None,
        })
    }

    /// Build a client directly from provider instances
    pub fn from_providers(primary: Arc<dyn Provider>, fallback: Option<Arc<dyn Provider>>) -> Self {
        Self {
            primary,
            fallback,
            options: ChatOptions::default(),
            usage_sink: None,
        }
    }

    /// Route usage records to this sink instead of the process-wide one
    pub fn with_usage_sink(mut self, sink: UsageSink) -> Self {
        self.usage_sink = Some(sink);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn primary_provider(&self) -> &str {
        self.primary.name()
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, ProviderError> {
        self.execute_with_fallback(&messages, &[]).await
    }

    pub async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolSpec>,
    ) -> Result<ChatResponse, ProviderError> {
        self.execute_with_fallback(&messages, &tools).await
    }

    /// Structured single-shot analysis: one tool-augmented chat call
    /// whose first tool invocation carries the result. Returns
    /// `Ok(None)` when the model answered in free text instead of
    /// calling the tool; callers supply their own default for that case.
    pub async fn analyze(
        &self,
        text: &str,
        instruction: &str,
        tool: ToolSpec,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        let messages = vec![ChatMessage::system(instruction), ChatMessage::user(text)];
        let response = self
            .execute_with_fallback(&messages, std::slice::from_ref(&tool))
            .await?;

        Ok(response
            .tool_calls
            .into_iter()
            .next()
            .map(|call| call.arguments))
    }

    /// The single call policy behind chat, chat_with_tools, and analyze
    async fn execute_with_fallback(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ProviderError> {
        match self.call_provider(self.primary.as_ref(), messages, tools).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                let Some(ref fallback) = self.fallback else {
                    return Err(primary_err);
                };
                warn!(
                    primary = self.primary.name(),
                    fallback = fallback.name(),
                    "primary provider failed, retrying on fallback: {primary_err}"
                );
                self.call_provider(fallback.as_ref(), messages, tools).await
            }
        }
    }

    /// One independently timed attempt against one provider, with its
    /// usage record emitted regardless of outcome
    async fn call_provider(
        &self,
        provider: &dyn Provider,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, ProviderError> {
        let started = Instant::now();
        let result = if tools.is_empty() {
            provider.chat(messages, &self.options).await
        } else {
            provider.chat_with_tools(messages, tools, &self.options).await
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                if let Some(ref token_usage) = response.usage {
                    self.record(UsageRecord::success(
                        provider.name(),
                        &response.model,
                        token_usage,
                        duration_ms,
                    ));
                }
            }
            Err(e) => {
                self.record(UsageRecord::failure(
                    provider.name(),
                    provider.model(),
                    duration_ms,
                    e.to_string(),
                ));
            }
        }

        result
    }

    fn record(&self, record: UsageRecord) {
        if let Some(ref sink) = self.usage_sink {
            sink(&record);
        } else if let Some(sink) = usage::global_sink() {
            sink(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ProviderInfo, TokenUsage, ToolCall};
    use async_trait::async_trait;
    use std::sync::Mutex;

    enum Script {
        Succeed { usage: bool, tool_call: bool },
        Fail(&'static str),
    }

    struct MockProvider {
        provider_name: &'static str,
        model_name: &'static str,
        script: Script,
    }

    impl MockProvider {
        fn respond(&self) -> Result<ChatResponse, ProviderError> {
            match &self.script {
                Script::Succeed { usage, tool_call } => Ok(ChatResponse {
                    content: Some("done".to_string()),
                    tool_calls: if *tool_call {
                        vec![ToolCall {
                            id: Some("call_1".to_string()),
                            name: "record_analysis".to_string(),
                            arguments: serde_json::json!({ "label": "invoice" }),
                        }]
                    } else {
                        Vec::new()
                    },
                    usage: usage.then_some(TokenUsage {
                        input_tokens: 100,
                        output_tokens: 20,
                    }),
                    model: self.model_name.to_string(),
                }),
                Script::Fail(message) => Err(ProviderError::APIError(message.to_string())),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            self.provider_name
        }

        fn model(&self) -> &str {
            self.model_name
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: &ChatOptions,
        ) -> Result<ChatResponse, ProviderError> {
            self.respond()
        }

        async fn chat_with_tools(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
            _options: &ChatOptions,
        ) -> Result<ChatResponse, ProviderError> {
            self.respond()
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: self.provider_name.to_string(),
                model: self.model_name.to_string(),
                context_window: 0,
                max_tokens: 0,
            }
        }
    }

    fn anthropic_broken() -> Arc<dyn Provider> {
        Arc::new(MockProvider {
            provider_name: "anthropic",
            model_name: "claude-sonnet-4-20250514",
            script: Script::Fail("authentication_error"),
        })
    }

    fn openai_healthy() -> Arc<dyn Provider> {
        Arc::new(MockProvider {
            provider_name: "openai",
            model_name: "gpt-4o",
            script: Script::Succeed {
                usage: true,
                tool_call: false,
            },
        })
    }

    fn recording_client(
        primary: Arc<dyn Provider>,
        fallback: Option<Arc<dyn Provider>>,
    ) -> (AiClient, Arc<Mutex<Vec<UsageRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let client = AiClient::from_providers(primary, fallback)
            .with_usage_sink(Arc::new(move |record| {
                sink.lock().unwrap().push(record.clone());
            }));
        (client, records)
    }

    #[tokio::test]
    async fn fallback_recovers_from_primary_failure() {
        let (client, records) = recording_client(anthropic_broken(), Some(openai_healthy()));

        let response = client.chat(vec![ChatMessage::user("hello")]).await.unwrap();
        assert_eq!(response.model, "gpt-4o");

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].success);
        assert_eq!(records[0].provider, "anthropic");
        assert!(records[0].error.as_deref().unwrap().contains("authentication_error"));
        assert!(records[1].success);
        assert_eq!(records[1].provider, "openai");
        assert_eq!(records[1].input_tokens, 100);
    }

    #[tokio::test]
    async fn primary_failure_without_fallback_rethrows() {
        let (client, records) = recording_client(anthropic_broken(), None);

        let result = client.chat(vec![ChatMessage::user("hello")]).await;
        assert!(result.unwrap_err().to_string().contains("authentication_error"));

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn both_failing_propagates_the_fallback_error() {
        let fallback: Arc<dyn Provider> = Arc::new(MockProvider {
            provider_name: "openai",
            model_name: "gpt-4o",
            script: Script::Fail("fallback down"),
        });
        let (client, records) = recording_client(anthropic_broken(), Some(fallback));

        let error = client.chat(vec![ChatMessage::user("hello")]).await.unwrap_err();
        assert!(error.to_string().contains("fallback down"));

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.success));
    }

    #[tokio::test]
    async fn success_without_usage_emits_no_record() {
        let primary: Arc<dyn Provider> = Arc::new(MockProvider {
            provider_name: "anthropic",
            model_name: "claude-sonnet-4-20250514",
            script: Script::Succeed {
                usage: false,
                tool_call: false,
            },
        });
        let (client, records) = recording_client(primary, None);

        client.chat(vec![ChatMessage::user("hello")]).await.unwrap();
        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn analyze_returns_first_tool_call_arguments() {
        let primary: Arc<dyn Provider> = Arc::new(MockProvider {
            provider_name: "anthropic",
            model_name: "claude-sonnet-4-20250514",
            script: Script::Succeed {
                usage: true,
                tool_call: true,
            },
        });
        let (client, _records) = recording_client(primary, None);

        let analysis = client
            .analyze(
                "Invoice #42, total $180",
                "Classify the document",
                ToolSpec::new("record_analysis", "Record the result", serde_json::json!({})),
            )
            .await
            .unwrap();

        assert_eq!(analysis.unwrap()["label"], "invoice");
    }

    #[tokio::test]
    async fn analyze_without_tool_calls_is_none_not_an_error() {
        let primary: Arc<dyn Provider> = Arc::new(MockProvider {
            provider_name: "anthropic",
            model_name: "claude-sonnet-4-20250514",
            script: Script::Succeed {
                usage: true,
                tool_call: false,
            },
        });
        let (client, _records) = recording_client(primary, None);

        let analysis = client
            .analyze(
                "Hello there",
                "Classify the document",
                ToolSpec::new("record_analysis", "Record the result", serde_json::json!({})),
            )
            .await
            .unwrap();

        assert!(analysis.is_none());
    }
}
