//! Agent lifecycle state machine
//!
//! An [`Agent`] wraps one unit of recurring or on-demand work (an
//! [`AgentTask`] implementation) with a lifecycle state machine
//! (idle/running/paused/error), safe start/stop semantics, an optional
//! self-arming interval timer, and a lifecycle event stream.
//!
//! Lifecycle transitions serialize through a per-agent gate so that a
//! `stop()` issued while a `start()` is still completing is sequenced
//! after it; `run_once` deliberately bypasses the gate so an in-flight
//! execution never blocks a stop.

pub mod events;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::current_timestamp_millis;
use events::{dispatch_event, AgentEvent, AgentEventKind, EventHandler};

/// Immutable identity and configuration of an agent
///
/// Read-only after construction; the schedule is the one exception and
/// is updated exclusively through the scheduler's reconfiguration path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique registry key
    pub id: String,
    pub name: String,
    pub description: String,
    /// Disabled agents are skipped by batch start
    pub enabled: bool,
    pub schedule: ScheduleSpec,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            schedule: ScheduleSpec::Manual,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Self-triggering recurring execution; `minutes` must be positive
    pub fn with_interval(mut self, minutes: u64) -> Self {
        self.schedule = ScheduleSpec::Interval { minutes };
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.schedule = ScheduleSpec::Cron {
            expression: expression.into(),
        };
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// When an agent executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Fixed-period self-triggering execution
    Interval { minutes: u64 },
    /// Stored opaque; the engine performs no cron evaluation. An external
    /// trigger is expected to call `run_once` for these agents.
    Cron { expression: String },
    /// Execution only on explicit external request
    Manual,
}

/// Current lifecycle status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Outcome of a single execution
///
/// Produced fresh on every `run_once` call and never mutated after
/// return. `success == false` is the steady-state failure signal;
/// the returned `duration_ms` is always the wrapper's own wall-clock
/// measurement, even when `execute` filled one in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp_ms: u64,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn ok(payload: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            payload,
            error: None,
            timestamp_ms: current_timestamp_millis(),
            duration_ms: 0,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            timestamp_ms: current_timestamp_millis(),
            duration_ms: 0,
        }
    }

    fn skipped_paused() -> Self {
        Self::fail("agent is paused")
    }
}

/// The unit of work an agent performs
///
/// `execute` is mandatory; `initialize` runs once per `start()` before
/// the agent flips to running, and `cleanup` runs on `stop()` before it
/// flips back to idle. An `Err` from `execute` forces the agent into the
/// error state; returning `RunOutcome { success: false, .. }` does not.
#[async_trait]
pub trait AgentTask: Send + Sync {
    async fn execute(&self, input: Option<serde_json::Value>) -> anyhow::Result<RunOutcome>;

    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Mutable lifecycle state, owned exclusively by the agent
struct AgentState {
    status: AgentStatus,
    last_run_ms: Option<u64>,
    run_count: u64,
    timer: Option<TimerHandle>,
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Shared inner state; the interval timer task holds a `Weak` reference
/// to it so a dropped agent cannot keep its timer alive.
struct AgentCore {
    id: String,
    descriptor: RwLock<AgentDescriptor>,
    state: Mutex<AgentState>,
    task: Arc<dyn AgentTask>,
    listeners: RwLock<Vec<EventHandler>>,
}

impl AgentCore {
    fn state_guard(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn descriptor(&self) -> AgentDescriptor {
        self.descriptor
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn status(&self) -> AgentStatus {
        self.state_guard().status
    }

    fn set_status(&self, status: AgentStatus) {
        self.state_guard().status = status;
    }

    fn take_timer(&self) -> Option<TimerHandle> {
        self.state_guard().timer.take()
    }

    fn emit(&self, kind: AgentEventKind, details: Option<serde_json::Value>) {
        let handlers: Vec<EventHandler> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        let event = AgentEvent::new(kind, &self.id, details);
        dispatch_event(&handlers, &event);
    }

    /// Execution wrapper shared by direct calls and timer ticks
    async fn run_once(&self, input: Option<serde_json::Value>) -> RunOutcome {
        {
            let mut state = self.state_guard();
            // Local short-circuit, not a failure transition: no counter
            // bump, no event.
            if state.status == AgentStatus::Paused {
                debug!(agent = %self.id, "run skipped: agent is paused");
                return RunOutcome::skipped_paused();
            }
            state.last_run_ms = Some(current_timestamp_millis());
            state.run_count += 1;
        }

        let started = tokio::time::Instant::now();
        match self.task.execute(input).await {
            Ok(mut outcome) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                outcome.duration_ms = duration_ms;
                if outcome.success {
                    self.emit(
                        AgentEventKind::Completed,
                        Some(json!({ "result": outcome, "duration_ms": duration_ms })),
                    );
                } else {
                    let error = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "execution reported failure".to_string());
                    self.emit(
                        AgentEventKind::Failed,
                        Some(json!({ "error": error, "duration_ms": duration_ms })),
                    );
                }
                outcome
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let error = format!("{e:#}");
                warn!(agent = %self.id, "execution failed: {error}");
                self.set_status(AgentStatus::Error);
                self.emit(AgentEventKind::Failed, Some(json!({ "error": error })));
                RunOutcome {
                    success: false,
                    payload: None,
                    error: Some(error),
                    timestamp_ms: current_timestamp_millis(),
                    duration_ms,
                }
            }
        }
    }

    /// A panic inside a timer-spawned run unwinds off the calling stack;
    /// funnel it into the same failed-event path with a marker.
    fn record_background_panic(&self) {
        warn!(agent = %self.id, "background execution panicked");
        self.set_status(AgentStatus::Error);
        self.emit(
            AgentEventKind::Failed,
            Some(json!({ "error": "background execution panicked", "background": true })),
        );
    }

    /// Arm the interval timer. The first tick fires immediately; every
    /// tick dispatches a supervised fire-and-forget run.
    fn arm_timer(core: &Arc<AgentCore>, minutes: u64) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak = Arc::downgrade(core);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(minutes.max(1) * 60));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(core) = weak.upgrade() else { break };
                        tokio::spawn(Self::supervised_run(core));
                    }
                }
            }
        });

        let mut state = core.state_guard();
        // At most one timer per agent: re-arming tears down any
        // predecessor before the new handle is stored.
        if let Some(old) = state.timer.take() {
            old.cancel.cancel();
            old.task.abort();
        }
        state.timer = Some(TimerHandle { cancel, task });
    }

    async fn supervised_run(core: Arc<AgentCore>) {
        let run = AssertUnwindSafe(core.run_once(None)).catch_unwind().await;
        match run {
            Ok(outcome) => {
                if !outcome.success {
                    debug!(
                        agent = %core.id,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "scheduled run did not succeed"
                    );
                }
            }
            Err(_) => core.record_background_panic(),
        }
    }
}

impl Drop for AgentCore {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(timer) = state.timer.take() {
                timer.cancel.cancel();
                timer.task.abort();
            }
        }
    }
}

/// One schedulable unit of work with its own lifecycle state
pub struct Agent {
    core: Arc<AgentCore>,
    /// Serializes start/stop/pause/resume per agent
    gate: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn new(descriptor: AgentDescriptor, task: Arc<dyn AgentTask>) -> Self {
        let id = descriptor.id.clone();
        Self {
            core: Arc::new(AgentCore {
                id,
                descriptor: RwLock::new(descriptor),
                state: Mutex::new(AgentState {
                    status: AgentStatus::Idle,
                    last_run_ms: None,
                    run_count: 0,
                    timer: None,
                }),
                task,
                listeners: RwLock::new(Vec::new()),
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn descriptor(&self) -> AgentDescriptor {
        self.core.descriptor()
    }

    pub fn status(&self) -> AgentStatus {
        self.core.status()
    }

    pub fn last_run_ms(&self) -> Option<u64> {
        self.core.state_guard().last_run_ms
    }

    /// Cumulative run counter; monotonic for the life of the process
    pub fn run_count(&self) -> u64 {
        self.core.state_guard().run_count
    }

    /// Register a lifecycle event handler for this agent
    pub fn on_event(&self, handler: EventHandler) {
        if let Ok(mut listeners) = self.core.listeners.write() {
            listeners.push(handler);
        }
    }

    /// Start the agent: run `initialize`, flip to running, emit
    /// `started`, and arm the interval timer when one is configured.
    ///
    /// A no-op while already running. An `initialize` failure forces the
    /// error state, emits `failed`, and is returned to the caller; the
    /// timer is never armed in that case.
    pub async fn start(&self) -> anyhow::Result<()> {
        let _gate = self.gate.lock().await;

        if self.core.status() == AgentStatus::Running {
            debug!(agent = %self.core.id, "start ignored: already running");
            return Ok(());
        }

        if let Err(e) = self.core.task.initialize().await {
            let error = format!("{e:#}");
            warn!(agent = %self.core.id, "initialization failed: {error}");
            self.core.set_status(AgentStatus::Error);
            self.core
                .emit(AgentEventKind::Failed, Some(json!({ "error": error })));
            return Err(e.context(format!("agent '{}' failed to initialize", self.core.id)));
        }

        self.core.set_status(AgentStatus::Running);
        self.core.emit(AgentEventKind::Started, None);
        tracing::info!(agent = %self.core.id, "agent started");

        match self.core.descriptor().schedule {
            ScheduleSpec::Interval { minutes } => AgentCore::arm_timer(&self.core, minutes),
            ScheduleSpec::Cron { ref expression } => {
                // Stored, not evaluated: an external trigger drives run_once
                debug!(agent = %self.core.id, cron = %expression, "cron schedule stored");
            }
            ScheduleSpec::Manual => {}
        }

        Ok(())
    }

    /// Stop the agent: cancel the timer, run `cleanup`, flip to idle.
    ///
    /// Emits `paused` (a full stop has no distinct event kind). Accepted
    /// from any state; an in-flight execution is never cancelled, only
    /// future timer ticks are.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let _gate = self.gate.lock().await;

        if let Some(timer) = self.core.take_timer() {
            timer.cancel.cancel();
            timer.task.abort();
        }

        self.core
            .task
            .cleanup()
            .await
            .map_err(|e| e.context(format!("agent '{}' cleanup failed", self.core.id)))?;

        self.core.set_status(AgentStatus::Idle);
        self.core.emit(AgentEventKind::Paused, None);
        tracing::info!(agent = %self.core.id, "agent stopped");
        Ok(())
    }

    /// Pause a running agent. The interval timer stays armed; the pause
    /// guard in `run_once` turns its ticks into no-ops until `stop()`.
    pub async fn pause(&self) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.core.state_guard();
            if state.status != AgentStatus::Running {
                debug!(agent = %self.core.id, status = %state.status, "pause ignored");
                return;
            }
            state.status = AgentStatus::Paused;
        }
        self.core.emit(AgentEventKind::Paused, None);
        tracing::info!(agent = %self.core.id, "agent paused");
    }

    /// Resume a paused agent
    pub async fn resume(&self) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.core.state_guard();
            if state.status != AgentStatus::Paused {
                debug!(agent = %self.core.id, status = %state.status, "resume ignored");
                return;
            }
            state.status = AgentStatus::Running;
        }
        self.core.emit(AgentEventKind::Resumed, None);
        tracing::info!(agent = %self.core.id, "agent resumed");
    }

    /// Execute once through the common wrapper: stamps last-run, bumps
    /// the run counter, measures duration, and emits the completion or
    /// failure event. While paused this returns a failure outcome
    /// immediately with no side effects.
    pub async fn run_once(&self, input: Option<serde_json::Value>) -> RunOutcome {
        self.core.run_once(input).await
    }

    /// Reschedule to a fixed interval. Takes effect on the next start;
    /// the scheduler's reconfiguration path handles the restart cycle.
    pub(crate) fn set_interval(&self, minutes: u64) {
        if let Ok(mut descriptor) = self.core.descriptor.write() {
            descriptor.schedule = ScheduleSpec::Interval { minutes };
        }
    }
}
