//! hoistd — the Hoist daemon.
//!
//! One binary, two roles:
//! - `scheduler`: pending queue, offer matcher, placement tracker, the
//!   cluster endpoints, and the admin API
//! - `agent`: offers this host's capacity and executes the operations it
//!   is handed against the local Docker daemon
//!
//! # Usage
//!
//! ```text
//! hoistd scheduler --config hoist.toml --admin-port 3000
//! hoistd agent --scheduler-url http://10.0.0.1:5050 --hostname host-a
//! ```

mod agent_mode;
mod scheduler_mode;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hoist_core::{HoistConfig, QueueOrder};

#[derive(Parser)]
#[command(name = "hoistd", about = "Hoist live-migration daemon")]
struct Cli {
    /// Path to hoist.toml; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler (cluster endpoints + admin API).
    Scheduler {
        /// Port for offers and status updates.
        #[arg(long)]
        cluster_port: Option<u16>,

        /// Port for the admin API.
        #[arg(long)]
        admin_port: Option<u16>,

        /// Exchange service base URL stamped on every operation.
        #[arg(long)]
        exchange_url: Option<String>,

        /// Pop the oldest pending operation first instead of the newest.
        #[arg(long)]
        fifo: bool,
    },

    /// Run the host agent.
    Agent {
        /// Scheduler cluster endpoint base URL.
        #[arg(long)]
        scheduler_url: Option<String>,

        /// Host name to offer under.
        #[arg(long)]
        hostname: Option<String>,

        /// CPUs to offer.
        #[arg(long)]
        cpus: Option<f64>,

        /// Memory (MiB) to offer.
        #[arg(long)]
        mem: Option<f64>,

        /// Scratch directory for checkpoint images and archives.
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hoistd=debug,hoist=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => HoistConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))?,
        None => HoistConfig::default(),
    };

    match cli.command {
        Command::Scheduler {
            cluster_port,
            admin_port,
            exchange_url,
            fifo,
        } => {
            let scheduler = &mut config.scheduler;
            if let Some(port) = cluster_port {
                scheduler.cluster_port = port;
            }
            if let Some(port) = admin_port {
                scheduler.admin_port = port;
            }
            if let Some(url) = exchange_url {
                scheduler.exchange_url = url;
            }
            if fifo {
                scheduler.queue_order = QueueOrder::Fifo;
            }
            scheduler_mode::run_scheduler(config.scheduler).await
        }
        Command::Agent {
            scheduler_url,
            hostname,
            cpus,
            mem,
            work_dir,
        } => {
            let agent = &mut config.agent;
            if let Some(url) = scheduler_url {
                agent.scheduler_url = url;
            }
            if hostname.is_some() {
                agent.hostname = hostname;
            }
            if let Some(cpus) = cpus {
                agent.cpus = cpus;
            }
            if let Some(mem) = mem {
                agent.mem = mem;
            }
            if let Some(dir) = work_dir {
                agent.work_dir = dir;
            }
            agent_mode::run_agent(config.agent).await
        }
        Command::PrintConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
