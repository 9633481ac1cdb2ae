//! Telegram notification transport
//!
//! Delivers hub notifications to a chat through the Telegram Bot API.
//! Messages go out as plain text (a Markdown parse failure would reject
//! the whole message); failures surface Telegram's `description` field
//! instead of a bare status code.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Channel, ChannelError, ChannelInfo, OutboundMessage};

pub struct TelegramChannel {
    client: Client,
    token: String,
    connected: AtomicBool,
}

/// Bot API reply envelope: failures arrive as `ok: false` plus a
/// human-readable description
#[derive(Debug, Deserialize)]
struct TelegramReply<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BotProfile {
    #[serde(default)]
    username: Option<String>,
}

impl TelegramChannel {
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

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn initialize(&self) -> Result<(), ChannelError> {
        let reply = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::AuthenticationFailed(e.to_string()))?
            .json::<TelegramReply<BotProfile>>()
            .await
            .map_err(|e| ChannelError::AuthenticationFailed(e.to_string()))?;

        if !reply.ok {
            return Err(ChannelError::AuthenticationFailed(format!(
                "Telegram rejected the bot token: {}",
                reply.description.as_deref().unwrap_or("unspecified")
            )));
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            bot = reply
                .result
                .and_then(|profile| profile.username)
                .as_deref()
                .unwrap_or("?"),
            "Telegram channel ready"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: &OutboundMessage, chat_id: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message.flattened(),
        });

        let reply = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?
            .json::<TelegramReply<serde_json::Value>>()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        if reply.ok {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(format!(
                "sendMessage: {}",
                reply.description.as_deref().unwrap_or("unspecified")
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
