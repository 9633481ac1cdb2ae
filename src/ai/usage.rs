//! Usage accounting and cost model
//!
//! Every AI call attempt, success or failure, produces a [`UsageRecord`]
//! handed to a process-wide sink. Cost is computed from a static
//! per-model price table and expressed in micro-dollars (1 USD =
//! 1,000,000 units) so many small charges accumulate without
//! floating-point drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::warn;

use super::TokenUsage;

/// Accounting entry for one AI call attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Micro-dollars (1 USD = 1,000,000)
    pub cost_micros: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn success(provider: &str, model: &str, usage: &TokenUsage, duration_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            duration_ms,
            success: true,
            error: None,
            cost_micros: cost_micros(model, usage.input_tokens, usage.output_tokens),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(provider: &str, model: &str, duration_ms: u64, error: String) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            success: false,
            error: Some(error),
            cost_micros: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Prices in micro-dollars per million tokens (input, output), matched
/// by model-name prefix. More specific prefixes come first.
const MODEL_PRICES: &[(&str, u64, u64)] = &[
    ("claude-opus", 15_000_000, 75_000_000),
    ("claude-sonnet", 3_000_000, 15_000_000),
    ("claude-haiku", 800_000, 4_000_000),
    ("gpt-4o-mini", 150_000, 600_000),
    ("gpt-4o", 2_500_000, 10_000_000),
    ("gpt-4.1-mini", 400_000, 1_600_000),
    ("gpt-4.1", 2_000_000, 8_000_000),
];

/// Approximate blended rate for models absent from the table
const BLENDED_PRICE: (u64, u64) = (2_000_000, 8_000_000);

pub fn cost_micros(model: &str, input_tokens: u64, output_tokens: u64) -> u64 {
    let (input_rate, output_rate) = MODEL_PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(BLENDED_PRICE);

    input_tokens * input_rate / 1_000_000 + output_tokens * output_rate / 1_000_000
}

/// Sink receiving every usage record
pub type UsageSink = Arc<dyn Fn(&UsageRecord) + Send + Sync>;

static USAGE_SINK: OnceLock<UsageSink> = OnceLock::new();

/// Install the process-wide usage sink. May be set at most once; later
/// calls are ignored with a warning. While unset, usage tracking is a
/// no-op.
pub fn set_usage_sink(sink: UsageSink) {
    if USAGE_SINK.set(sink).is_err() {
        warn!("usage sink already set; ignoring replacement");
    }
}

pub(crate) fn global_sink() -> Option<&'static UsageSink> {
    USAGE_SINK.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_pricing() {
        // 1M input + 1M output tokens of claude-sonnet: $3 + $15
        assert_eq!(
            cost_micros("claude-sonnet-4-20250514", 1_000_000, 1_000_000),
            18_000_000
        );
        // gpt-4o-mini must not match the gpt-4o row
        assert_eq!(cost_micros("gpt-4o-mini", 1_000_000, 0), 150_000);
        assert_eq!(cost_micros("gpt-4o", 1_000_000, 0), 2_500_000);
    }

    #[test]
    fn test_unknown_model_uses_blended_rate() {
        assert_eq!(
            cost_micros("experimental-model", 1_000_000, 1_000_000),
            10_000_000
        );
    }

    #[test]
    fn test_small_charges_stay_integral() {
        // 120 input + 40 output tokens of claude-sonnet
        let cost = cost_micros("claude-sonnet-4-20250514", 120, 40);
        assert_eq!(cost, 120 * 3 + 40 * 15);
    }

    #[test]
    fn test_success_record_carries_cost() {
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 500,
        };
        let record = UsageRecord::success("anthropic", "claude-sonnet-4-20250514", &usage, 840);
        assert!(record.success);
        assert_eq!(record.cost_micros, 1000 * 3 + 500 * 15);
        assert_eq!(record.duration_ms, 840);
    }

    #[test]
    fn test_failure_record_is_zero_cost() {
        let record = UsageRecord::failure("openai", "gpt-4o", 120, "auth error".to_string());
        assert!(!record.success);
        assert_eq!(record.input_tokens, 0);
        assert_eq!(record.cost_micros, 0);
        assert_eq!(record.error.as_deref(), Some("auth error"));
    }
}
