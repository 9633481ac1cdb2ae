//! AI Provider Trait and Factory
//!
//! Defines a unified interface for LLM providers enabling
//! runtime-swappable backends with a fixed fallback pairing:
//! - Anthropic (Claude)
//! - OpenAI (GPT-4o family)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod anthropic;
pub mod client;
pub mod openai;
pub mod usage;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;

// ============================================================================
// Message Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A tool the model may call, described by a JSON schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool invocation the model requested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Free-text answer, if the model produced one
    pub content: Option<String>,
    /// Tool invocations, in the order the model emitted them
    pub tool_calls: Vec<ToolCall>,
    /// Token accounting, when the backend reports it
    pub usage: Option<TokenUsage>,
    /// Model that actually served the request
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(4096),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub context_window: usize,
    pub max_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Plain chat completion
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Chat completion with tools the model may call
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Get provider info for display
    fn info(&self) -> ProviderInfo;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderError {
    NotConfigured(String),
    RateLimited(String),
    InvalidRequest(String),
    APIError(String),
    NetworkError(String),
    Timeout,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::NotConfigured(p) => write!(f, "Provider {} not configured", p),
            ProviderError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::APIError(msg) => write!(f, "API error: {}", msg),
            ProviderError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ProviderError::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::InvalidRequest(e.to_string())
    }
}

// ============================================================================
// Provider Type Enum
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAI => write!(f, "openai"),
        }
    }
}

impl ProviderKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" => Some(ProviderKind::Anthropic),
            "openai" => Some(ProviderKind::OpenAI),
            _ => None,
        }
    }

    /// The fixed fallback pairing: each provider's fallback is the other
    /// known provider type
    pub fn other(&self) -> ProviderKind {
        match self {
            ProviderKind::Anthropic => ProviderKind::OpenAI,
            ProviderKind::OpenAI => ProviderKind::Anthropic,
        }
    }

    /// Conventional environment variable holding this provider's API key
    pub fn env_api_key(&self) -> Option<String> {
        let var = match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        };
        std::env::var(var).ok().filter(|key| !key.is_empty())
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAI => "gpt-4o",
        }
    }
}

// ============================================================================
// Provider Factory
// ============================================================================

pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider from configuration
    pub fn create(
        kind: ProviderKind,
        api_key: Option<&str>,
        model: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(kind.to_string()))?;
        let model = model.unwrap_or_else(|| kind.default_model());

        match kind {
            ProviderKind::Anthropic => Ok(Arc::new(AnthropicClient::new(api_key, model)?)),
            ProviderKind::OpenAI => Ok(Arc::new(OpenAIClient::new(api_key, model, None)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!(
            ProviderKind::from_str("anthropic"),
            Some(ProviderKind::Anthropic)
        );
        assert_eq!(ProviderKind::from_str("OpenAI"), Some(ProviderKind::OpenAI));
        assert_eq!(ProviderKind::from_str("unknown"), None);
    }

    #[test]
    fn test_fallback_pairing() {
        assert_eq!(ProviderKind::Anthropic.other(), ProviderKind::OpenAI);
        assert_eq!(ProviderKind::OpenAI.other(), ProviderKind::Anthropic);
    }

    #[test]
    fn test_factory_requires_api_key() {
        assert!(matches!(
            ProviderFactory::create(ProviderKind::Anthropic, None, None),
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(matches!(
            ProviderFactory::create(ProviderKind::OpenAI, Some(""), None),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_chat_options_default() {
        let options = ChatOptions::default();
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.max_tokens, Some(4096));
    }

    #[test]
    fn test_message_constructors() {
        let msg = ChatMessage::user("classify this");
        assert_eq!(msg.role, ChatRole::User);
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
