//! Hub configuration
//!
//! JSON settings file under the platform config directory, with
//! environment variables overlaying anything the file leaves out.
//! Credentials resolve file-first, then env, so production builds can
//! run from user-provided keys without a config file at all.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ai::ProviderKind;
use crate::channels::ChannelKind;

const CONFIG_DIR: &str = "autohub";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiSettings>,
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSettings {
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub fallback_api_key: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

impl AiSettings {
    pub fn for_provider(provider: ProviderKind, api_key: String) -> Self {
        Self {
            provider,
            api_key: Some(api_key),
            model: None,
            max_tokens: None,
            fallback_api_key: None,
            fallback_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub kind: ChannelKind,
    #[serde(default)]
    pub api_token: Option<String>,
    /// Slack channel id, Telegram chat id, or webhook URL
    pub destination: String,
}

impl HubConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Load from the default location and overlay environment variables
    pub fn load() -> Self {
        let mut config = Self::load_from(&Self::config_path());
        config.apply_env_overlay();
        config
    }

    /// Load from an explicit path; a missing or unparseable file yields
    /// the defaults
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(contents) = fs::read_to_string(path) {
                if let Ok(config) = serde_json::from_str(&contents) {
                    return config;
                }
                debug!(path = %path.display(), "config file unparseable; using defaults");
            }
        }
        Self::default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Fill anything the file left out from the environment
    pub fn apply_env_overlay(&mut self) {
        match self.ai {
            None => {
                if let Some(key) = ProviderKind::Anthropic.env_api_key() {
                    self.ai = Some(AiSettings::for_provider(ProviderKind::Anthropic, key));
                } else if let Some(key) = ProviderKind::OpenAI.env_api_key() {
                    self.ai = Some(AiSettings::for_provider(ProviderKind::OpenAI, key));
                }
            }
            Some(ref mut ai) => {
                if ai.api_key.is_none() {
                    ai.api_key = ai.provider.env_api_key();
                }
            }
        }

        if !self.has_channel(ChannelKind::Slack) {
            if let (Ok(token), Ok(channel)) = (
                std::env::var("SLACK_BOT_TOKEN"),
                std::env::var("SLACK_CHANNEL"),
            ) {
                self.channels.push(ChannelSettings {
                    kind: ChannelKind::Slack,
                    api_token: Some(token),
                    destination: channel,
                });
            }
        }

        if !self.has_channel(ChannelKind::Telegram) {
            if let (Ok(token), Ok(chat_id)) = (
                std::env::var("TELEGRAM_BOT_TOKEN"),
                std::env::var("TELEGRAM_CHAT_ID"),
            ) {
                self.channels.push(ChannelSettings {
                    kind: ChannelKind::Telegram,
                    api_token: Some(token),
                    destination: chat_id,
                });
            }
        }

        if !self.has_channel(ChannelKind::Webhook) {
            if let Ok(url) = std::env::var("NOTIFY_WEBHOOK_URL") {
                self.channels.push(ChannelSettings {
                    kind: ChannelKind::Webhook,
                    api_token: None,
                    destination: url,
                });
            }
        }
    }

    fn has_channel(&self, kind: ChannelKind) -> bool {
        self.channels.iter().any(|c| c.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = HubConfig {
            ai: Some(AiSettings {
                provider: ProviderKind::Anthropic,
                api_key: Some("sk-test".to_string()),
                model: Some("claude-sonnet-4-20250514".to_string()),
                max_tokens: Some(2048),
                fallback_api_key: None,
                fallback_model: None,
            }),
            channels: vec![ChannelSettings {
                kind: ChannelKind::Slack,
                api_token: Some("xoxb-test".to_string()),
                destination: "#alerts".to_string(),
            }],
        };

        config.save_to(&path).unwrap();
        let loaded = HubConfig::load_from(&path);

        let ai = loaded.ai.unwrap();
        assert_eq!(ai.provider, ProviderKind::Anthropic);
        assert_eq!(ai.max_tokens, Some(2048));
        assert_eq!(loaded.channels.len(), 1);
        assert_eq!(loaded.channels[0].kind, ChannelKind::Slack);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HubConfig::load_from(&dir.path().join("missing.json"));
        assert!(config.ai.is_none());
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = HubConfig::load_from(&path);
        assert!(config.ai.is_none());
    }
}
