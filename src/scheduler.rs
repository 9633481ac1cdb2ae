//! Process-wide agent registry and orchestration
//!
//! The [`AgentScheduler`] owns every live [`Agent`] instance, supervises
//! batch start/stop, rebroadcasts agent-local lifecycle events to
//! scheduler-level subscribers, and supports live interval
//! reconfiguration. It holds no locks across awaits; each agent
//! serializes its own lifecycle transitions internally, so cross-agent
//! operations run fully in parallel.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agent::events::{dispatch_event, EventHandler};
use crate::agent::{Agent, AgentDescriptor, AgentStatus, RunOutcome};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no agent registered with id '{0}'")]
    AgentNotFound(String),
    #[error(transparent)]
    Agent(#[from] anyhow::Error),
}

/// Read-only view of one registered agent
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentSnapshot {
    pub descriptor: AgentDescriptor,
    pub status: AgentStatus,
    pub last_run_ms: Option<u64>,
    pub run_count: u64,
}

pub struct AgentScheduler {
    /// Registry keyed by agent id; read-mostly
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    /// Process-wide subscribers receiving every agent's events
    listeners: Arc<RwLock<Vec<EventHandler>>>,
}

impl Default for AgentScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentScheduler {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an agent by its descriptor id. Duplicate registration is
    /// non-fatal: logged and ignored. The scheduler subscribes to the
    /// agent's event stream and rebroadcasts to its own subscribers.
    pub fn register(&self, agent: Arc<Agent>) {
        let id = agent.id().to_string();

        let mut map = match self.agents.write() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(agent = %id, "registry lock poisoned; registration dropped");
                return;
            }
        };

        if map.contains_key(&id) {
            warn!(agent = %id, "agent already registered; ignoring duplicate");
            return;
        }

        let listeners = Arc::clone(&self.listeners);
        agent.on_event(Arc::new(move |event| {
            let handlers = listeners.read().map(|g| g.clone()).unwrap_or_default();
            dispatch_event(&handlers, event);
            Ok(())
        }));

        info!(agent = %id, "agent registered");
        map.insert(id, agent);
    }

    /// Stop and remove an agent; absent ids are a no-op
    pub async fn unregister(&self, agent_id: &str) {
        let Some(agent) = self.lookup(agent_id) else {
            debug!(agent = %agent_id, "unregister ignored: not registered");
            return;
        };

        if let Err(e) = agent.stop().await {
            warn!(agent = %agent_id, "stop during unregister failed: {e:#}");
        }

        if let Ok(mut map) = self.agents.write() {
            map.remove(agent_id);
        }
        info!(agent = %agent_id, "agent unregistered");
    }

    /// Start every enabled agent concurrently. One agent's failed start
    /// is logged and never blocks or fails the others.
    pub async fn start_all(&self) {
        let agents: Vec<Arc<Agent>> = self
            .snapshot_agents()
            .into_iter()
            .filter(|agent| agent.descriptor().enabled)
            .collect();

        info!(count = agents.len(), "starting agents");
        let starts = agents.into_iter().map(|agent| async move {
            if let Err(e) = agent.start().await {
                error!(agent = %agent.id(), "agent failed to start: {e:#}");
            }
        });
        futures::future::join_all(starts).await;
    }

    /// Stop every registered agent concurrently, with the same
    /// independence guarantee as [`start_all`](Self::start_all)
    pub async fn stop_all(&self) {
        let agents = self.snapshot_agents();

        info!(count = agents.len(), "stopping agents");
        let stops = agents.into_iter().map(|agent| async move {
            if let Err(e) = agent.stop().await {
                error!(agent = %agent.id(), "agent failed to stop: {e:#}");
            }
        });
        futures::future::join_all(stops).await;
    }

    pub async fn start(&self, agent_id: &str) -> Result<(), SchedulerError> {
        let agent = self.get(agent_id)?;
        agent.start().await.map_err(SchedulerError::Agent)
    }

    pub async fn stop(&self, agent_id: &str) -> Result<(), SchedulerError> {
        let agent = self.get(agent_id)?;
        agent.stop().await.map_err(SchedulerError::Agent)
    }

    /// Execute one agent immediately. Failures are reported through the
    /// outcome, not as errors; only an unknown id errors here.
    pub async fn run_once(
        &self,
        agent_id: &str,
        input: Option<serde_json::Value>,
    ) -> Result<RunOutcome, SchedulerError> {
        let agent = self.get(agent_id)?;
        Ok(agent.run_once(input).await)
    }

    /// Snapshots of every registered agent; no internal mutable state is
    /// exposed by reference
    pub fn agents(&self) -> Vec<AgentSnapshot> {
        self.snapshot_agents()
            .into_iter()
            .map(|agent| snapshot(&agent))
            .collect()
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentSnapshot> {
        self.lookup(agent_id).map(|agent| snapshot(&agent))
    }

    /// Switch an agent to a fixed interval. A running agent goes through
    /// a stop/start cycle so the new period takes effect with a freshly
    /// armed timer. Returns false (logged, never thrown) on unknown ids,
    /// a zero interval, or any error during the cycle.
    pub async fn update_agent_interval(&self, agent_id: &str, minutes: u64) -> bool {
        if minutes == 0 {
            warn!(agent = %agent_id, "interval must be positive");
            return false;
        }

        let Some(agent) = self.lookup(agent_id) else {
            warn!(agent = %agent_id, "cannot reschedule unknown agent");
            return false;
        };

        let was_running = agent.status() == AgentStatus::Running;
        if was_running {
            if let Err(e) = agent.stop().await {
                error!(agent = %agent_id, "stop during reschedule failed: {e:#}");
                return false;
            }
        }

        agent.set_interval(minutes);

        if was_running {
            if let Err(e) = agent.start().await {
                error!(agent = %agent_id, "restart during reschedule failed: {e:#}");
                return false;
            }
        }

        info!(agent = %agent_id, minutes, "agent interval updated");
        true
    }

    /// Subscribe to every registered agent's lifecycle events. Handler
    /// failures are isolated per handler and never halt delivery.
    pub fn on_event(&self, handler: EventHandler) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(handler);
        }
    }

    fn get(&self, agent_id: &str) -> Result<Arc<Agent>, SchedulerError> {
        self.lookup(agent_id)
            .ok_or_else(|| SchedulerError::AgentNotFound(agent_id.to_string()))
    }

    fn lookup(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents
            .read()
            .ok()
            .and_then(|map| map.get(agent_id).cloned())
    }

    fn snapshot_agents(&self) -> Vec<Arc<Agent>> {
        self.agents
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn snapshot(agent: &Agent) -> AgentSnapshot {
    AgentSnapshot {
        descriptor: agent.descriptor(),
        status: agent.status(),
        last_run_ms: agent.last_run_ms(),
        run_count: agent.run_count(),
    }
}
