//! hoist.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable single-host setup. Durations are human strings: `"5s"`,
//! `"500ms"`, `"1m"`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{QueueOrder, Resources};

/// Shell script of the synthetic counter container used by `RUN_CONTAINER`
/// (when no override is given) and by the self-test. Commands run under
/// `/bin/sh -c` inside the container.
pub const COUNTER_COMMAND: &str =
    r#"i=0; while true; do echo "$HOSTNAME: $i"; i=$(expr $i + 1); sleep 1; done"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoistConfig {
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
}

/// Scheduler-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Port for the cluster transport (offers and status).
    pub cluster_port: u16,
    /// Port for the admin surface.
    pub admin_port: u16,
    /// CPU demand of every operation.
    pub cpu_per_task: f64,
    /// Memory demand (MiB) of every operation.
    pub mem_per_task: f64,
    /// Exchange service base URL stamped on every operation.
    pub exchange_url: String,
    pub queue_order: QueueOrder,
    /// How long a dispatched task may go without a `RUNNING` status before
    /// it is returned to the queue.
    pub dispatch_lease: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cluster_port: 5050,
            admin_port: 3000,
            cpu_per_task: 0.5,
            mem_per_task: 128.0,
            exchange_url: "http://127.0.0.1:3001".to_string(),
            queue_order: QueueOrder::Lifo,
            dispatch_lease: "30s".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Fixed per-operation demand.
    pub fn task_demand(&self) -> Resources {
        Resources::new(self.cpu_per_task, self.mem_per_task)
    }

    pub fn dispatch_lease(&self) -> CoreResult<Duration> {
        parse_duration(&self.dispatch_lease)
    }
}

/// Host-side (agent + executor) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the scheduler's cluster transport.
    pub scheduler_url: String,
    /// Name this host offers under; falls back to `$HOSTNAME`.
    pub hostname: Option<String>,
    /// Total CPUs this host offers.
    pub cpus: f64,
    /// Total memory (MiB) this host offers.
    pub mem: f64,
    pub offer_interval: String,
    /// Directory for checkpoint images and archives.
    pub work_dir: PathBuf,
    pub exchange_timeout: String,
    /// Optional endpoint receiving self-test progress notes.
    pub observer_url: Option<String>,
    pub docker_bin: String,
    pub tar_bin: String,
    pub default_image: String,
    pub default_command: String,
    pub selftest_min_wait: String,
    pub selftest_max_wait: String,
    /// How long shutdown waits for in-flight operations.
    pub shutdown_grace: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scheduler_url: "http://127.0.0.1:5050".to_string(),
            hostname: None,
            cpus: 1.0,
            mem: 1024.0,
            offer_interval: "1s".to_string(),
            work_dir: std::env::temp_dir(),
            exchange_timeout: "60s".to_string(),
            observer_url: None,
            docker_bin: "docker".to_string(),
            tar_bin: "tar".to_string(),
            default_image: "busybox:latest".to_string(),
            default_command: COUNTER_COMMAND.to_string(),
            selftest_min_wait: "5s".to_string(),
            selftest_max_wait: "18s".to_string(),
            shutdown_grace: "30s".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn capacity(&self) -> Resources {
        Resources::new(self.cpus, self.mem)
    }

    /// Resolved hostname: explicit setting, then `$HOSTNAME`, then `localhost`.
    pub fn resolved_hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub fn offer_interval(&self) -> CoreResult<Duration> {
        parse_duration(&self.offer_interval)
    }

    pub fn exchange_timeout(&self) -> CoreResult<Duration> {
        parse_duration(&self.exchange_timeout)
    }

    pub fn shutdown_grace(&self) -> CoreResult<Duration> {
        parse_duration(&self.shutdown_grace)
    }

    /// Self-test wait bounds as `(min, max)`; `max` is clamped to `min`.
    pub fn selftest_wait(&self) -> CoreResult<(Duration, Duration)> {
        let min = parse_duration(&self.selftest_min_wait)?;
        let max = parse_duration(&self.selftest_max_wait)?;
        Ok((min, max.max(min)))
    }
}

impl HoistConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HoistConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let parsed = if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| CoreError::InvalidDuration(s.to_string()))
}
