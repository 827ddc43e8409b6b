//! Scheduler mode — owns the pending queue and placement table.
//!
//! In this mode, the daemon:
//! 1. Builds the scheduler from the `[scheduler]` config section
//! 2. Serves the cluster endpoints (offers, status) on `cluster_port`
//! 3. Serves the admin API on `admin_port`
//! 4. On Ctrl-C, stops both servers

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

use hoist_core::SchedulerConfig;
use hoist_scheduler::Scheduler;

/// Run the scheduler until interrupted.
pub async fn run_scheduler(config: SchedulerConfig) -> anyhow::Result<()> {
    info!("Hoist daemon starting in scheduler mode");

    let lease = config.dispatch_lease()?;
    let scheduler = Scheduler::new(&config);
    info!(
        order = ?config.queue_order,
        lease = ?lease,
        exchange = %config.exchange_url,
        cpus = config.cpu_per_task,
        mem = config.mem_per_task,
        "scheduler initialized"
    );

    // ── Shutdown signal ──────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Cluster endpoints ────────────────────────────────────────
    let cluster_addr = SocketAddr::from(([0, 0, 0, 0], config.cluster_port));
    let cluster_listener = tokio::net::TcpListener::bind(cluster_addr).await?;
    info!(addr = %cluster_addr, "cluster endpoints listening");
    let cluster_router = hoist_cluster::cluster_router(scheduler.clone());
    let mut cluster_shutdown = shutdown_rx.clone();
    let cluster_handle = tokio::spawn(async move {
        axum::serve(cluster_listener, cluster_router)
            .with_graceful_shutdown(async move {
                let _ = cluster_shutdown.changed().await;
            })
            .await
    });

    // ── Admin API ────────────────────────────────────────────────
    let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.admin_port));
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;
    info!(addr = %admin_addr, "admin API listening");
    let admin_router = hoist_api::build_router(scheduler.clone());
    let mut admin_shutdown = shutdown_rx;
    let admin_handle = tokio::spawn(async move {
        axum::serve(admin_listener, admin_router)
            .with_graceful_shutdown(async move {
                let _ = admin_shutdown.changed().await;
            })
            .await
    });

    // ── Wait for shutdown ────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    cluster_handle.await??;
    admin_handle.await??;

    let stats = scheduler.stats().await;
    info!(
        launched = stats.tasks_launched,
        finished = stats.tasks_finished,
        failed = stats.tasks_failed,
        reclaimed = stats.tasks_reclaimed,
        pending = stats.pending,
        dispatched = stats.dispatched,
        "scheduler stopped"
    );
    Ok(())
}
