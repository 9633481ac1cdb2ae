//! Lifecycle event stream
//!
//! Every agent state transition is reported as an immutable `AgentEvent`
//! delivered to registered handlers. Delivery is at-most-once and
//! best-effort: a failing handler is logged and never interrupts delivery
//! to the remaining handlers or the operation that emitted the event.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::utils::current_timestamp_millis;

/// Atomic counter for unique event IDs
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique event ID
fn next_event_id() -> String {
    let counter = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("evt_{}_{}", current_timestamp_millis(), counter)
}

/// Kind of lifecycle transition an event reports
///
/// A full stop is reported as `Paused`; there is no separate stopped
/// variant, matching what downstream consumers already key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    Started,
    Completed,
    Failed,
    Paused,
    Resumed,
}

impl std::fmt::Display for AgentEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentEventKind::Started => write!(f, "started"),
            AgentEventKind::Completed => write!(f, "completed"),
            AgentEventKind::Failed => write!(f, "failed"),
            AgentEventKind::Paused => write!(f, "paused"),
            AgentEventKind::Resumed => write!(f, "resumed"),
        }
    }
}

/// An immutable record of one agent lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event identifier
    pub id: String,
    /// What happened
    pub kind: AgentEventKind,
    /// Which agent it happened to
    pub agent_id: String,
    /// Unix timestamp (milliseconds)
    pub timestamp_ms: u64,
    /// Structured details, e.g. `{result, duration_ms}` on completion
    /// or `{error}` on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, agent_id: &str, details: Option<serde_json::Value>) -> Self {
        Self {
            id: next_event_id(),
            kind,
            agent_id: agent_id.to_string(),
            timestamp_ms: current_timestamp_millis(),
            details,
        }
    }
}

/// Callback invoked for every lifecycle event
pub type EventHandler = Arc<dyn Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync>;

/// Deliver an event to each handler, isolating per-handler failures
pub(crate) fn dispatch_event(handlers: &[EventHandler], event: &AgentEvent) {
    for handler in handlers {
        if let Err(e) = handler(event) {
            tracing::warn!(
                agent = %event.agent_id,
                kind = %event.kind,
                "event handler failed: {e:#}"
            );
        }
    }
}
