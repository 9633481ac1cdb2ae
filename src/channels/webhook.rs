//! Generic Webhook Channel Implementation
//!
//! Posts the full structured notification as JSON to a caller-supplied
//! URL. The destination passed to `send` is the webhook URL itself, so
//! one channel instance can serve any number of endpoints.

use async_trait::async_trait;
use reqwest::Client;

use super::{Channel, ChannelError, ChannelInfo, OutboundMessage};

pub struct WebhookChannel {
    client: Client,
}

impl WebhookChannel {
    pub fn new() -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wire format: title, text, and priority are always present so
    /// receivers can rely on the shape
    fn payload(message: &OutboundMessage) -> serde_json::Value {
        serde_json::json!({
            "title": message.title,
            "text": message.body,
            "priority": message.priority,
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn send(&self, message: &OutboundMessage, url: &str) -> Result<(), ChannelError> {
        if !url.starts_with("http") {
            return Err(ChannelError::NotConfigured(format!(
                "webhook destination is not a URL: {}",
                url
            )));
        }

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(format!(
                "Status: {}",
                response.status()
            )))
        }
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self.name().to_string(),
            connected: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::NotifyPriority;

    #[tokio::test]
    async fn test_rejects_non_url_destination() {
        let channel = WebhookChannel::new().unwrap();
        let message = OutboundMessage::new("hello");
        let result = channel.send(&message, "not-a-url").await;
        assert!(matches!(result, Err(ChannelError::NotConfigured(_))));
    }

    #[test]
    fn test_payload_carries_all_three_fields() {
        let message = OutboundMessage::new("peg drifted 40bps")
            .with_title("Stablecoin watch")
            .with_priority(NotifyPriority::High);

        let payload = WebhookChannel::payload(&message);
        assert_eq!(payload["title"], "Stablecoin watch");
        assert_eq!(payload["text"], "peg drifted 40bps");
        assert_eq!(payload["priority"], "high");
    }

    #[test]
    fn test_payload_without_title_is_explicit_null() {
        let payload = WebhookChannel::payload(&OutboundMessage::new("ping"));
        assert!(payload["title"].is_null());
        assert_eq!(payload["priority"], "normal");
    }
}
