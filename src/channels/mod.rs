//! Channel Trait for Notification Transports
//!
//! Defines a unified interface for outbound messaging channels enabling
//! multi-platform delivery. Channels receive the structured
//! [`OutboundMessage`] so each transport decides how to render title and
//! priority for its surface.
//!
//! Supported channels:
//! - Slack
//! - Telegram
//! - Generic webhook

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod slack;
pub mod telegram;
pub mod webhook;

pub use slack::SlackChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

// ============================================================================
// Message Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for NotifyPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyPriority::Low => write!(f, "low"),
            NotifyPriority::Normal => write!(f, "normal"),
            NotifyPriority::High => write!(f, "high"),
            NotifyPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Transport-agnostic notification payload handed to channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    pub priority: NotifyPriority,
}

impl OutboundMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
            priority: NotifyPriority::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_priority(mut self, priority: NotifyPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Single-string rendering for chat-style transports: priority tag
    /// for high/critical, then the title line, then the body
    pub fn flattened(&self) -> String {
        let mut text = String::new();
        if self.priority >= NotifyPriority::High {
            text.push_str(&format!("[{}] ", self.priority));
        }
        if let Some(ref title) = self.title {
            text.push_str(title);
            text.push('\n');
        }
        text.push_str(&self.body);
        text
    }
}

// ============================================================================
// Channel Trait
// ============================================================================

#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Initialize the channel (connect, authenticate, etc.)
    async fn initialize(&self) -> Result<(), ChannelError>;

    /// Check if the channel is connected
    fn is_connected(&self) -> bool;

    /// Deliver a message to a destination (channel id, chat id, or URL,
    /// depending on the transport)
    async fn send(&self, message: &OutboundMessage, destination: &str)
        -> Result<(), ChannelError>;

    /// Get channel info for display
    fn info(&self) -> ChannelInfo;
}

// ============================================================================
// Channel Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelError {
    NotConfigured(String),
    SendFailed(String),
    AuthenticationFailed(String),
    RateLimited(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::NotConfigured(c) => write!(f, "Channel {} not configured", c),
            ChannelError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            ChannelError::AuthenticationFailed(msg) => write!(f, "Authentication failed: {}", msg),
            ChannelError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
        }
    }
}

impl std::error::Error for ChannelError {}

// ============================================================================
// Channel Type Enum
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Telegram,
    Webhook,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Slack => write!(f, "slack"),
            ChannelKind::Telegram => write!(f, "telegram"),
            ChannelKind::Webhook => write!(f, "webhook"),
        }
    }
}

impl ChannelKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "slack" => Some(ChannelKind::Slack),
            "telegram" => Some(ChannelKind::Telegram),
            "webhook" => Some(ChannelKind::Webhook),
            _ => None,
        }
    }
}

// ============================================================================
// Channel Factory
// ============================================================================

pub struct ChannelFactory;

impl ChannelFactory {
    pub fn create(
        kind: ChannelKind,
        api_token: Option<&str>,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        match kind {
            ChannelKind::Slack => {
                let token = api_token
                    .ok_or_else(|| ChannelError::NotConfigured("slack".to_string()))?;
                Ok(Arc::new(SlackChannel::new(token)?))
            }
            ChannelKind::Telegram => {
                let token = api_token
                    .ok_or_else(|| ChannelError::NotConfigured("telegram".to_string()))?;
                Ok(Arc::new(TelegramChannel::new(token)?))
            }
            ChannelKind::Webhook => Ok(Arc::new(WebhookChannel::new()?)),
        }
    }

    pub fn available_channels() -> Vec<ChannelKind> {
        vec![ChannelKind::Slack, ChannelKind::Telegram, ChannelKind::Webhook]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_from_str() {
        assert_eq!(ChannelKind::from_str("slack"), Some(ChannelKind::Slack));
        assert_eq!(ChannelKind::from_str("Telegram"), Some(ChannelKind::Telegram));
        assert_eq!(ChannelKind::from_str("unknown"), None);
    }

    #[test]
    fn test_factory_requires_tokens() {
        assert!(matches!(
            ChannelFactory::create(ChannelKind::Slack, None),
            Err(ChannelError::NotConfigured(_))
        ));
        assert!(ChannelFactory::create(ChannelKind::Webhook, None).is_ok());
    }

    #[test]
    fn test_flattened_rendering() {
        let plain = OutboundMessage::new("ledger drift detected");
        assert_eq!(plain.flattened(), "ledger drift detected");

        let titled = OutboundMessage::new("ledger drift detected").with_title("Stablecoin watch");
        assert_eq!(titled.flattened(), "Stablecoin watch\nledger drift detected");

        let urgent = OutboundMessage::new("peg lost")
            .with_title("Stablecoin watch")
            .with_priority(NotifyPriority::Critical);
        assert_eq!(urgent.flattened(), "[critical] Stablecoin watch\npeg lost");

        // Normal priority carries no tag
        let normal = OutboundMessage::new("ok").with_priority(NotifyPriority::Normal);
        assert_eq!(normal.flattened(), "ok");
    }
}
