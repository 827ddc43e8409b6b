//! Agent mode — runs on worker hosts next to the Docker daemon.
//!
//! In this mode, the daemon:
//! 1. Builds the migration executor from the `[agent]` config section
//! 2. Offers the host's spare capacity to the scheduler every interval
//! 3. Executes admitted operations and posts their statuses back
//! 4. On Ctrl-C, stops offering and waits out `shutdown_grace` for
//!    in-flight operations; stragglers are reported failed

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use hoist_cluster::{HttpStatusReporter, NodeAgent, NodeAgentConfig};
use hoist_core::AgentConfig;
use hoist_executor::MigrationExecutor;

/// Run the host agent until interrupted.
pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    info!("Hoist daemon starting in agent mode");

    std::fs::create_dir_all(&config.work_dir)?;
    let agent_config = NodeAgentConfig::from_config(&config)?;

    // ── Executor ─────────────────────────────────────────────────
    let reporter = Arc::new(HttpStatusReporter::new(&agent_config.scheduler_url));
    let executor = MigrationExecutor::from_config(&config, reporter)?;
    info!(
        host = %executor.host(),
        work_dir = ?config.work_dir,
        docker = %config.docker_bin,
        "executor initialized"
    );

    // ── Offer loop ───────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = NodeAgent::new(agent_config, executor);
    let offer_handle = tokio::spawn(async move {
        if let Err(e) = agent.run(shutdown_rx).await {
            tracing::error!(error = %e, "offer loop error");
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = offer_handle.await;

    info!("agent stopped");
    Ok(())
}
