//! Slack notification transport
//!
//! Delivers hub notifications through the Slack Web API with a bot
//! token. Titles render as bold mrkdwn; every API reply is checked for
//! Slack's `ok` field, since the Web API reports failures inside a 200
//! response.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Channel, ChannelError, ChannelInfo, NotifyPriority, OutboundMessage};

const API_BASE: &str = "https://slack.com/api";

pub struct SlackChannel {
    client: Client,
    token: String,
    connected: AtomicBool,
}

/// Envelope shared by every Slack Web API method we use
#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

impl SlackChannel {
    pub fn new(token: &str) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(e.to_string()))?;

        Ok(Self {
            client,
            token: token.to_string(),
            connected: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", API_BASE, method)
    }

    /// Render a notification as Slack mrkdwn
    fn render(message: &OutboundMessage) -> String {
        let mut text = String::new();
        if message.priority >= NotifyPriority::High {
            text.push_str(&format!("[{}] ", message.priority));
        }
        if let Some(ref title) = message.title {
            text.push_str(&format!("*{}*\n", title));
        }
        text.push_str(&message.body);
        text
    }

    /// POST one Web API method; the caller classifies the error string
    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<SlackReply, String> {
        let response = self
            .client
            .post(self.endpoint(method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("{} returned HTTP {}", method, response.status()));
        }

        response.json::<SlackReply>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        let auth = self
            .call("auth.test", &serde_json::json!({}))
            .await
            .map_err(ChannelError::AuthenticationFailed)?;

        if !auth.ok {
            return Err(ChannelError::AuthenticationFailed(format!(
                "Slack rejected the bot token: {}",
                auth.error.as_deref().unwrap_or("unspecified")
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            team = auth.team.as_deref().unwrap_or("?"),
            "Slack channel ready"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(
        &self,
        message: &OutboundMessage,
        channel_id: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "channel": channel_id,
            "text": Self::render(message),
        });

        let posted = self
            .call("chat.postMessage", &body)
            .await
            .map_err(ChannelError::SendFailed)?;

        if posted.ok {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(format!(
                "chat.postMessage: {}",
                posted.error.as_deref().unwrap_or("unspecified")
            )))
        }
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self.name().to_string(),
            connected: self.is_connected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let channel = SlackChannel::new("xoxb-unit-test").unwrap();
        assert_eq!(
            channel.endpoint("chat.postMessage"),
            "https://slack.com/api/chat.postMessage"
        );
    }

    #[test]
    fn test_render_bolds_the_title() {
        let message = OutboundMessage::new("3 contracts need review").with_title("Legal scan");
        assert_eq!(
            SlackChannel::render(&message),
            "*Legal scan*\n3 contracts need review"
        );
    }

    #[test]
    fn test_render_tags_urgent_messages() {
        let message = OutboundMessage::new("peg lost").with_priority(NotifyPriority::Critical);
        assert_eq!(SlackChannel::render(&message), "[critical] peg lost");
    }

    #[test]
    fn test_reply_envelope_parses_failures() {
        let reply: SlackReply =
            serde_json::from_value(serde_json::json!({ "ok": false, "error": "channel_not_found" }))
                .unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("channel_not_found"));
    }
}
