//! Autohub Daemon
//!
//! Boots the hub context, registers a sample pulse agent, and runs the
//! fleet until interrupted. Useful as a smoke test of the scheduling
//! engine and as the template for wiring real agents.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::json;

use autohub::{
    Agent, AgentDescriptor, AgentTask, HubConfig, HubContext, Notifier, NotifyOptions, RunOutcome,
};

#[derive(Parser)]
#[command(name = "autohub-daemon")]
#[command(about = "Runs the autohub agent fleet")]
#[command(version)]
struct Cli {
    /// Pulse agent interval in minutes
    #[arg(short, long, default_value_t = 15)]
    interval: u64,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, env = "AUTOHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Run every registered agent once and exit
    #[arg(long)]
    once: bool,
}

/// Sample agent: reports that the fleet is alive through the notifier
struct PulseTask {
    notifier: Arc<Notifier>,
}

#[async_trait]
impl AgentTask for PulseTask {
    async fn execute(&self, _input: Option<serde_json::Value>) -> anyhow::Result<RunOutcome> {
        let delivered = self
            .notifier
            .notify("autohub pulse: fleet is alive", NotifyOptions::default())
            .await;
        Ok(RunOutcome::ok(Some(json!({ "delivered": delivered }))))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autohub=debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file found or error loading: {}", e);
    }

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = HubConfig::load_from(path);
            config.apply_env_overlay();
            config
        }
        None => HubConfig::load(),
    };

    let context = HubContext::from_config(&config);

    context.scheduler.on_event(Arc::new(|event| {
        tracing::info!(agent = %event.agent_id, kind = %event.kind, "lifecycle event");
        Ok(())
    }));

    let descriptor = AgentDescriptor::new("pulse", "Pulse")
        .with_description("Periodic liveness report for the fleet")
        .with_interval(cli.interval);
    let pulse = Arc::new(Agent::new(
        descriptor,
        Arc::new(PulseTask {
            notifier: Arc::clone(&context.notifier),
        }),
    ));
    context.scheduler.register(pulse);

    if cli.once {
        let outcome = context.scheduler.run_once("pulse", None).await?;
        tracing::info!(
            success = outcome.success,
            duration_ms = outcome.duration_ms,
            "single run finished"
        );
        return Ok(());
    }

    context.scheduler.start_all().await;
    tracing::info!("autohub running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    context.scheduler.stop_all().await;

    Ok(())
}
