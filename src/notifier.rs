//! Notification fan-out
//!
//! The [`Notifier`] delivers a message to every bound channel (or one
//! channel named in the options) concurrently, isolating per-channel
//! transport failures. It never throws: delivery reports as a boolean
//! and callers must check it. Channels receive the structured
//! [`OutboundMessage`] and render title and priority for their own
//! surface. A bounded in-memory history of recent notifications is kept
//! for inspection.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::channels::{Channel, OutboundMessage};
use crate::utils::current_timestamp_millis;

pub use crate::channels::NotifyPriority;

const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    /// Restrict delivery to the channel with this name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub priority: NotifyPriority,
    pub timestamp_ms: u64,
}

impl Notification {
    fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            title: self.title.clone(),
            body: self.body.clone(),
            priority: self.priority,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    pub title: Option<String>,
    pub channel: Option<String>,
    pub priority: Option<NotifyPriority>,
}

/// A transport plus the destination it delivers to (Slack channel id,
/// Telegram chat id, webhook URL)
pub struct ChannelBinding {
    pub channel: Arc<dyn Channel>,
    pub destination: String,
}

pub struct Notifier {
    bindings: Vec<ChannelBinding>,
    history: RwLock<Vec<Notification>>,
}

impl Notifier {
    pub fn new(bindings: Vec<ChannelBinding>) -> Self {
        Self {
            bindings,
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.bindings
            .iter()
            .map(|binding| binding.channel.name().to_string())
            .collect()
    }

    /// Convenience wrapper building a [`Notification`] from a message
    /// and options. Returns true iff at least one channel delivered.
    pub async fn notify(&self, message: &str, options: NotifyOptions) -> bool {
        self.send(Notification {
            title: options.title,
            body: message.to_string(),
            channel: options.channel,
            priority: options.priority.unwrap_or_default(),
            timestamp_ms: current_timestamp_millis(),
        })
        .await
    }

    /// Fan a notification out to every targeted channel concurrently.
    /// Transport failures are logged per channel and reported through
    /// the boolean, never thrown.
    pub async fn send(&self, notification: Notification) -> bool {
        self.remember(&notification);

        let message = notification.to_outbound();

        let targets: Vec<&ChannelBinding> = self
            .bindings
            .iter()
            .filter(|binding| {
                notification
                    .channel
                    .as_deref()
                    .map_or(true, |name| binding.channel.name() == name)
            })
            .collect();

        if targets.is_empty() {
            warn!(
                channel = notification.channel.as_deref().unwrap_or("*"),
                "no notification channel matched"
            );
            return false;
        }

        let sends = targets.into_iter().map(|binding| {
            let message = &message;
            async move {
                match binding.channel.send(message, &binding.destination).await {
                    Ok(()) => {
                        debug!(channel = binding.channel.name(), "notification delivered");
                        true
                    }
                    Err(e) => {
                        warn!(
                            channel = binding.channel.name(),
                            "notification delivery failed: {e}"
                        );
                        false
                    }
                }
            }
        });

        let results = futures::future::join_all(sends).await;
        results.into_iter().any(|delivered| delivered)
    }

    /// Recent notifications, newest first
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        match self.history.read() {
            Ok(history) => history.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    fn remember(&self, notification: &Notification) {
        if let Ok(mut history) = self.history.write() {
            history.push(notification.clone());
            if history.len() > MAX_HISTORY {
                let start = history.len() - MAX_HISTORY;
                *history = history.split_off(start);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelError, ChannelInfo};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockChannel {
        channel_name: &'static str,
        healthy: bool,
        attempts: AtomicU64,
        last: StdMutex<Option<OutboundMessage>>,
    }

    impl MockChannel {
        fn new(channel_name: &'static str, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                channel_name,
                healthy,
                attempts: AtomicU64::new(0),
                last: StdMutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            self.channel_name
        }

        async fn initialize(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn send(
            &self,
            message: &OutboundMessage,
            _destination: &str,
        ) -> Result<(), ChannelError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(message.clone());
            if self.healthy {
                Ok(())
            } else {
                Err(ChannelError::SendFailed("socket closed".to_string()))
            }
        }

        fn info(&self) -> ChannelInfo {
            ChannelInfo {
                name: self.channel_name.to_string(),
                connected: true,
            }
        }
    }

    fn binding(channel: Arc<MockChannel>) -> ChannelBinding {
        ChannelBinding {
            channel,
            destination: "#alerts".to_string(),
        }
    }

    #[tokio::test]
    async fn delivery_succeeds_when_any_channel_works() {
        let broken = MockChannel::new("slack", false);
        let healthy = MockChannel::new("telegram", true);
        let notifier = Notifier::new(vec![
            binding(Arc::clone(&broken)),
            binding(Arc::clone(&healthy)),
        ]);

        let delivered = notifier.notify("stablecoin drifted", NotifyOptions::default()).await;

        assert!(delivered);
        // The broken channel was attempted and isolated
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delivery_fails_when_all_channels_fail() {
        let notifier = Notifier::new(vec![binding(MockChannel::new("slack", false))]);
        assert!(!notifier.notify("ping", NotifyOptions::default()).await);
    }

    #[tokio::test]
    async fn no_channels_means_no_delivery() {
        let notifier = Notifier::new(Vec::new());
        assert!(!notifier.notify("ping", NotifyOptions::default()).await);
    }

    #[tokio::test]
    async fn channel_option_targets_one_transport() {
        let slack = MockChannel::new("slack", true);
        let telegram = MockChannel::new("telegram", true);
        let notifier = Notifier::new(vec![
            binding(Arc::clone(&slack)),
            binding(Arc::clone(&telegram)),
        ]);

        let delivered = notifier
            .notify(
                "legal review ready",
                NotifyOptions {
                    channel: Some("slack".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert!(delivered);
        assert_eq!(slack.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(telegram.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn channels_receive_the_structured_message() {
        let slack = MockChannel::new("slack", true);
        let notifier = Notifier::new(vec![binding(Arc::clone(&slack))]);

        notifier
            .notify(
                "3 new opportunities",
                NotifyOptions {
                    title: Some("Commercial scan".to_string()),
                    priority: Some(NotifyPriority::High),
                    ..Default::default()
                },
            )
            .await;

        let received = slack.last.lock().unwrap().clone().unwrap();
        assert_eq!(received.title.as_deref(), Some("Commercial scan"));
        assert_eq!(received.body, "3 new opportunities");
        assert_eq!(received.priority, NotifyPriority::High);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let notifier = Notifier::new(vec![binding(MockChannel::new("slack", true))]);

        for i in 0..120 {
            notifier
                .notify(&format!("message {i}"), NotifyOptions::default())
                .await;
        }

        let recent = notifier.recent(200);
        assert_eq!(recent.len(), MAX_HISTORY);
        // Newest first
        assert_eq!(recent[0].body, "message 119");
    }

    #[tokio::test]
    async fn history_records_title_and_priority() {
        let notifier = Notifier::new(vec![binding(MockChannel::new("slack", true))]);

        notifier
            .notify(
                "3 new opportunities",
                NotifyOptions {
                    title: Some("Commercial scan".to_string()),
                    priority: Some(NotifyPriority::High),
                    ..Default::default()
                },
            )
            .await;

        let recent = notifier.recent(1);
        assert_eq!(recent[0].title.as_deref(), Some("Commercial scan"));
        assert_eq!(recent[0].priority, NotifyPriority::High);
    }
}
