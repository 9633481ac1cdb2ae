//! Application context
//!
//! One explicit composition root bundling the scheduler, the notifier,
//! and the optional AI client, built from a [`HubConfig`]. Components
//! stay individually constructible for tests; the lazily-initialized
//! [`HubContext::global`] instance exists for ergonomic top-level use
//! and is never torn down before process exit.

use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::ai::client::{AiClient, AiClientConfig};
use crate::channels::ChannelFactory;
use crate::config::HubConfig;
use crate::notifier::{ChannelBinding, Notifier};
use crate::scheduler::AgentScheduler;

pub struct HubContext {
    pub scheduler: Arc<AgentScheduler>,
    pub notifier: Arc<Notifier>,
    /// Absent when no provider credentials are configured
    pub ai: Option<Arc<AiClient>>,
}

impl HubContext {
    pub fn from_config(config: &HubConfig) -> Self {
        let scheduler = Arc::new(AgentScheduler::new());

        let bindings: Vec<ChannelBinding> = config
            .channels
            .iter()
            .filter_map(|settings| {
                match ChannelFactory::create(settings.kind, settings.api_token.as_deref()) {
                    Ok(channel) => Some(ChannelBinding {
                        channel,
                        destination: settings.destination.clone(),
                    }),
                    Err(e) => {
                        warn!(channel = %settings.kind, "channel unavailable: {e}");
                        None
                    }
                }
            })
            .collect();
        let notifier = Arc::new(Notifier::new(bindings));

        let ai = config.ai.as_ref().and_then(|settings| {
            let Some(api_key) = settings.api_key.clone() else {
                warn!(provider = %settings.provider, "AI provider configured without an API key");
                return None;
            };
            let client_config = AiClientConfig {
                provider: settings.provider,
                api_key,
                model: settings.model.clone(),
                max_tokens: settings.max_tokens,
                fallback_api_key: settings.fallback_api_key.clone(),
                fallback_model: settings.fallback_model.clone(),
            };
            match AiClient::new(client_config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(provider = %settings.provider, "AI client unavailable: {e}");
                    None
                }
            }
        });

        Self {
            scheduler,
            notifier,
            ai,
        }
    }

    /// The process-wide default context, built once from the default
    /// configuration on first access
    pub fn global() -> &'static HubContext {
        static CONTEXT: OnceLock<HubContext> = OnceLock::new();
        CONTEXT.get_or_init(|| HubContext::from_config(&HubConfig::load()))
    }
}
