//! Node agent — host-side cluster participation.
//!
//! The agent runs on each worker host. Every offer interval it advertises
//! the host's spare capacity (total minus what in-flight operations hold)
//! to the scheduler and hands the admitted tasks to the executor. On
//! shutdown it stops offering and gives in-flight operations a grace
//! period to report before they are reported failed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use hoist_core::{AgentConfig, Resources, TaskStatus};
use hoist_executor::http_client;
use hoist_executor::{MigrationExecutor, StatusReporter};

use crate::wire::{OFFERS_PATH, OfferRequest, OfferResponse, STATUS_PATH};

/// Timeout for offer and status calls to the scheduler.
const SCHEDULER_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for the node agent.
#[derive(Debug, Clone)]
pub struct NodeAgentConfig {
    /// Base URL of the scheduler's cluster endpoints.
    pub scheduler_url: String,
    /// Host name offers are made under.
    pub host: String,
    /// Total capacity of this host.
    pub capacity: Resources,
    pub offer_interval: Duration,
    /// How long shutdown waits for in-flight operations.
    pub shutdown_grace: Duration,
}

impl NodeAgentConfig {
    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Self> {
        Ok(Self {
            scheduler_url: config.scheduler_url.trim_end_matches('/').to_string(),
            host: config.resolved_hostname(),
            capacity: config.capacity(),
            offer_interval: config.offer_interval()?,
            shutdown_grace: config.shutdown_grace()?,
        })
    }
}

/// Offers capacity and launches the tasks it is given.
pub struct NodeAgent {
    config: NodeAgentConfig,
    executor: MigrationExecutor,
}

impl NodeAgent {
    pub fn new(config: NodeAgentConfig, executor: MigrationExecutor) -> Self {
        Self { config, executor }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Capacity not held by in-flight operations.
    pub async fn spare(&self) -> Resources {
        let mut spare = self.config.capacity;
        spare.consume(&self.executor.in_flight().await);
        spare
    }

    /// Make one offer and launch whatever comes back. Returns the number
    /// of tasks launched.
    pub async fn offer_once(&self) -> anyhow::Result<usize> {
        let spare = self.spare().await;
        let url = format!("{}{}", self.config.scheduler_url, OFFERS_PATH);
        let resp = http_client::post_json(
            &url,
            &OfferRequest::new(self.config.host.as_str(), spare),
            SCHEDULER_TIMEOUT,
        )
        .await?;
        let resp = http_client::expect_success(&url, resp)?;
        let response: OfferResponse = serde_json::from_slice(&resp.body)?;

        let launched = response.tasks.len();
        if launched > 0 {
            info!(
                offer = %response.offer_id,
                host = %self.config.host,
                tasks = launched,
                "offer accepted"
            );
        } else {
            debug!(offer = %response.offer_id, cpus = spare.cpus, mem = spare.mem, "offer declined");
        }

        for task in response.tasks {
            let _ = self.executor.launch(task).await;
        }
        Ok(launched)
    }

    /// Offer loop; runs until `shutdown` flips, then drains the executor.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            host = %self.config.host,
            scheduler = %self.config.scheduler_url,
            interval = ?self.config.offer_interval,
            "offer loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.offer_interval) => {
                    if let Err(e) = self.offer_once().await {
                        warn!(host = %self.config.host, error = %e, "offer failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!(host = %self.config.host, "offer loop shutting down");
                    break;
                }
            }
        }

        let pending = self.executor.in_flight_tasks().await;
        if pending > 0 {
            info!(host = %self.config.host, pending, grace = ?self.config.shutdown_grace, "waiting for in-flight operations");
        }
        let abandoned = self.executor.drain(self.config.shutdown_grace).await;
        if abandoned > 0 {
            warn!(host = %self.config.host, abandoned, "operations reported failed at shutdown");
        }
        Ok(())
    }
}

/// Delivers task statuses to the scheduler's status endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusReporter {
    url: String,
}

impl HttpStatusReporter {
    pub fn new(scheduler_url: &str) -> Self {
        Self {
            url: format!("{}{}", scheduler_url.trim_end_matches('/'), STATUS_PATH),
        }
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, status: TaskStatus) -> anyhow::Result<()> {
        let resp = http_client::post_json(&self.url, &status, SCHEDULER_TIMEOUT).await?;
        http_client::expect_success(&self.url, resp)?;
        debug!(task = %status.task_id, state = ?status.state, "status delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_agent_section() {
        let config = AgentConfig {
            scheduler_url: "http://10.0.0.1:5050/".to_string(),
            hostname: Some("host-a".to_string()),
            cpus: 2.0,
            mem: 2048.0,
            offer_interval: "500ms".to_string(),
            shutdown_grace: "2m".to_string(),
            ..AgentConfig::default()
        };
        let agent = NodeAgentConfig::from_config(&config).unwrap();
        assert_eq!(agent.scheduler_url, "http://10.0.0.1:5050");
        assert_eq!(agent.host, "host-a");
        assert_eq!(agent.capacity, Resources::new(2.0, 2048.0));
        assert_eq!(agent.offer_interval, Duration::from_millis(500));
        assert_eq!(agent.shutdown_grace, Duration::from_secs(120));
    }

    #[test]
    fn status_url_is_joined() {
        let reporter = HttpStatusReporter::new("http://10.0.0.1:5050/");
        assert_eq!(reporter.url, "http://10.0.0.1:5050/cluster/v1/status");
    }
}
