//! Migration executor — runs dispatched operations on this host.
//!
//! Each dispatched task gets its own tokio task:
//!
//! ```text
//! launch(task) ──► report RUNNING ──► execute ──► report FINISHED | FAILED
//! ```
//!
//! Checkpoint and restore move a container through the exchange:
//!
//! ```text
//! source host                              target host
//! inspect ─► checkpoint ─► tar czf         GET download_container/{name}
//!        ─► POST upload_container    ───►  tar xzf ─► create ─► start --checkpoint
//!        ─► stop ─► rm
//! ```
//!
//! A failing sub-step fails only its own operation. When packing or upload
//! fails after the checkpoint, the source host restarts the container from
//! its own image before the operation fails. Scratch directories are
//! removed on every path.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hoist_core::labels::FILESERVER_IP;
use hoist_core::*;

use crate::archive::{Archiver, TarArchiver};
use crate::docker::{ContainerRuntime, DockerCli};
use crate::error::{ExecResult, ExecutionError};
use crate::exchange::{ExchangeClient, HttpExchange};
use crate::observer::{HttpObserver, LogObserver, ProgressObserver};
use crate::reporter::StatusReporter;
use crate::scratch::ScratchDir;

const DRAIN_POLL: Duration = Duration::from_millis(20);
const SHUTDOWN_MESSAGE: &str = "agent shut down before the operation finished";

/// Per-host executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub host: String,
    pub work_dir: PathBuf,
    pub default_image: String,
    pub default_command: String,
    /// Self-test wait bounds `(min, max)`.
    pub selftest_wait: (Duration, Duration),
}

impl ExecutorSettings {
    pub fn from_config(config: &AgentConfig) -> CoreResult<Self> {
        Ok(Self {
            host: config.resolved_hostname(),
            work_dir: config.work_dir.clone(),
            default_image: config.default_image.clone(),
            default_command: config.default_command.clone(),
            selftest_wait: config.selftest_wait()?,
        })
    }
}

/// Operations launched here whose terminal status has not gone out yet.
#[derive(Debug, Default)]
struct InFlight {
    held: Resources,
    tasks: HashMap<TaskId, TaskInfo>,
    /// Finished executing; terminal status being delivered.
    reporting: HashSet<TaskId>,
}

impl InFlight {
    fn start(&mut self, task: &TaskInfo) {
        // `release` adds, `consume` subtracts.
        self.held.release(&task.resources);
        self.tasks.insert(task.task_id.clone(), task.clone());
    }

    fn finish(&mut self, task_id: &str) -> Option<TaskInfo> {
        self.reporting.remove(task_id);
        let task = self.tasks.remove(task_id)?;
        self.held.consume(&task.resources);
        Some(task)
    }

    /// Take every operation still executing.
    fn abandon(&mut self) -> Vec<TaskInfo> {
        let ids: Vec<TaskId> = self
            .tasks
            .keys()
            .filter(|id| !self.reporting.contains(*id))
            .cloned()
            .collect();
        ids.iter().filter_map(|id| self.finish(id)).collect()
    }
}

/// Executes operations and reports their statuses.
///
/// Cheap to clone; clones share the collaborators and the in-flight set.
#[derive(Clone)]
pub struct MigrationExecutor {
    settings: Arc<ExecutorSettings>,
    runtime: Arc<dyn ContainerRuntime>,
    archiver: Arc<dyn Archiver>,
    exchange: Arc<dyn ExchangeClient>,
    observer: Arc<dyn ProgressObserver>,
    reporter: Arc<dyn StatusReporter>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl MigrationExecutor {
    /// Executor on the `docker` and `tar` binaries with the HTTP exchange.
    pub fn new(settings: ExecutorSettings, reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            settings: Arc::new(settings),
            runtime: Arc::new(DockerCli::default()),
            archiver: Arc::new(TarArchiver::default()),
            exchange: Arc::new(HttpExchange::default()),
            observer: Arc::new(LogObserver),
            reporter,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    /// Executor wired from the agent configuration.
    pub fn from_config(config: &AgentConfig, reporter: Arc<dyn StatusReporter>) -> CoreResult<Self> {
        let timeout = config.exchange_timeout()?;
        let observer: Arc<dyn ProgressObserver> = match &config.observer_url {
            Some(url) => Arc::new(HttpObserver::new(url.clone(), timeout)),
            None => Arc::new(LogObserver),
        };

        Ok(Self::new(ExecutorSettings::from_config(config)?, reporter)
            .with_runtime(Arc::new(DockerCli::new(config.docker_bin.clone())))
            .with_archiver(Arc::new(TarArchiver::new(config.tar_bin.clone())))
            .with_exchange(Arc::new(HttpExchange::new(timeout)))
            .with_observer(observer))
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_exchange(mut self, exchange: Arc<dyn ExchangeClient>) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    /// Resources held by operations that have not reported a terminal
    /// status yet.
    pub async fn in_flight(&self) -> Resources {
        self.in_flight.lock().await.held
    }

    /// Number of operations that have not reported a terminal status.
    pub async fn in_flight_tasks(&self) -> usize {
        self.in_flight.lock().await.tasks.len()
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Start a dispatched task in the background.
    pub async fn launch(&self, task: TaskInfo) -> JoinHandle<()> {
        self.in_flight.lock().await.start(&task);

        let executor = self.clone();
        tokio::spawn(async move {
            executor.run_to_completion(task).await;
        })
    }

    /// Wait up to `grace` for in-flight operations to report. Whatever is
    /// still executing afterwards is reported `FAILED` (retriable) and its
    /// own terminal status is dropped. Returns how many were abandoned.
    pub async fn drain(&self, grace: Duration) -> usize {
        let settled = tokio::time::timeout(grace, async {
            while self.in_flight_tasks().await > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        })
        .await;
        if settled.is_ok() {
            return 0;
        }

        let abandoned = self.in_flight.lock().await.abandon();
        for task in &abandoned {
            warn!(task = %task.task_id, host = %self.host(), ?grace, "operation still running at shutdown");
            self.report(TaskStatus::failed(task, SHUTDOWN_MESSAGE, true)).await;
        }
        abandoned.len()
    }

    /// Report `RUNNING`, execute, report the terminal status.
    async fn run_to_completion(&self, task: TaskInfo) {
        info!(task = %task.task_id, name = %task.name, host = %self.host(), "launching task");
        self.report(TaskStatus::running(&task)).await;

        let status = match self.execute(&task).await {
            Ok(data) => {
                info!(task = %task.task_id, "task finished");
                TaskStatus::finished(&task, data)
            }
            Err(e) => {
                error!(task = %task.task_id, error = %e, transient = e.is_transient(), "task failed");
                TaskStatus::failed(&task, e.to_string(), e.is_transient())
            }
        };

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.tasks.contains_key(&task.task_id) {
                warn!(task = %task.task_id, "already reported failed at shutdown, dropping final status");
                return;
            }
            in_flight.reporting.insert(task.task_id.clone());
        }
        self.report(status).await;
        self.in_flight.lock().await.finish(&task.task_id);
    }

    async fn report(&self, status: TaskStatus) {
        let task_id = status.task_id.clone();
        let state = status.state;
        if let Err(e) = self.reporter.report(status).await {
            warn!(task = %task_id, ?state, error = %e, "failed to deliver status update");
        }
    }

    /// Perform one operation. Returns the data carried in the `FINISHED`
    /// status.
    pub async fn execute(&self, task: &TaskInfo) -> ExecResult<Option<String>> {
        let op = task.operation()?;
        debug!(task = %task.task_id, kind = %op.kind, container = %op.container_name, "executing operation");

        match op.kind {
            OperationKind::RunContainer => self.run_container(&op).await.map(|_| None),
            OperationKind::CheckpointContainer => {
                self.checkpoint_container(&op, &task.task_id).await.map(|_| None)
            }
            OperationKind::RestoreContainer => {
                self.restore_container(&op, &task.task_id).await.map(|_| None)
            }
            OperationKind::GetLogs => self.runtime.logs(&op.container_name).await.map(Some),
            OperationKind::SelfTest => self.self_test(&op).await.map(Some),
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    async fn run_container(&self, op: &Operation) -> ExecResult<()> {
        let spec = ContainerSpec::new(
            op.container_name.as_str(),
            op.image.as_deref().unwrap_or(&self.settings.default_image),
            op.command.as_deref().unwrap_or(&self.settings.default_command),
        );
        self.runtime.run(&spec).await?;
        Ok(())
    }

    async fn checkpoint_container(&self, op: &Operation, task_id: &str) -> ExecResult<()> {
        let exchange = exchange_address(op)?;
        let name = op.container_name.as_str();

        let spec = self.runtime.inspect(name).await?;
        let scratch = ScratchDir::create(&self.settings.work_dir, &format!("checkpoint-{name}-{task_id}"))?;
        let image_dir = scratch.subdir("image")?;
        let archive = scratch.path().join("checkpoint.tar.gz");

        // The checkpoint leaves the container stopped. Until the upload
        // lands, the image in `image_dir` is the only copy of its state.
        self.runtime.checkpoint(name, &image_dir).await?;
        let shipped = async {
            self.archiver.pack(&image_dir, &archive).await?;
            let data = tokio::fs::read(&archive)
                .await
                .map_err(|e| ExecutionError::io(format!("reading {}", archive.display()), e))?;
            self.exchange
                .upload(exchange, &TransferEnvelope::new(spec, data))
                .await
        }
        .await;
        if let Err(cause) = shipped {
            return Err(self.resume_locally(name, &image_dir, cause).await);
        }

        // A failing stop / rm fails the operation; placement stays here.
        self.runtime.stop(name).await?;
        self.runtime.remove(name).await?;
        info!(container = %name, host = %self.host(), "container migrated out");
        Ok(())
    }

    /// Restart `name` here from its own checkpoint after shipping failed.
    /// Returns the error the operation fails with.
    async fn resume_locally(&self, name: &str, image_dir: &Path, cause: ExecutionError) -> ExecutionError {
        warn!(container = %name, error = %cause, "checkpoint not shipped, resuming container here");
        match self.runtime.restore(name, image_dir).await {
            Ok(()) => {
                info!(container = %name, host = %self.host(), "container resumed after failed checkpoint");
                cause
            }
            Err(resume) => {
                error!(container = %name, error = %resume, "container left stopped after failed checkpoint");
                ExecutionError::ResumeFailed {
                    name: name.to_string(),
                    cause: Box::new(cause),
                    resume: Box::new(resume),
                }
            }
        }
    }

    async fn restore_container(&self, op: &Operation, task_id: &str) -> ExecResult<()> {
        let exchange = exchange_address(op)?;
        let name = op.container_name.as_str();

        let envelope = self.exchange.download(exchange, name).await?;
        if envelope.container.name != name {
            return Err(ExecutionError::EnvelopeMismatch {
                expected: name.to_string(),
                found: envelope.container.name,
            });
        }

        let scratch = ScratchDir::create(&self.settings.work_dir, &format!("restore-{name}-{task_id}"))?;
        let archive = scratch.path().join("checkpoint.tar.gz");
        tokio::fs::write(&archive, &envelope.data)
            .await
            .map_err(|e| ExecutionError::io(format!("writing {}", archive.display()), e))?;
        let image_dir = scratch.subdir("image")?;
        self.archiver.unpack(&archive, &image_dir).await?;

        self.runtime.create(&envelope.container).await?;
        if let Err(e) = self.runtime.restore(name, &image_dir).await {
            // Remove the unstarted shell.
            if let Err(rm) = self.runtime.remove(name).await {
                warn!(container = %name, error = %rm, "failed to remove container shell");
            }
            return Err(e);
        }
        info!(container = %name, host = %self.host(), "container migrated in");
        Ok(())
    }

    async fn self_test(&self, op: &Operation) -> ExecResult<String> {
        let spec = ContainerSpec::new(
            op.container_name.as_str(),
            self.settings.default_image.as_str(),
            self.settings.default_command.as_str(),
        );
        let id = self.runtime.run(&spec).await?;
        self.observer
            .notify(&format!("Initialized docker container: {id}"))
            .await;

        let result = self.observe_counter(&spec.name).await;

        let cleanup = async {
            self.runtime.stop(&spec.name).await?;
            self.observer.notify(&format!("Stopped {}", spec.name)).await;
            self.runtime.remove(&spec.name).await?;
            self.observer.notify(&format!("Removed {}", spec.name)).await;
            Ok::<_, ExecutionError>(())
        };
        match (result, cleanup.await) {
            (Ok(logs), Ok(())) => Ok(logs),
            (Err(e), cleanup) => {
                if let Err(c) = cleanup {
                    warn!(container = %spec.name, error = %c, "self-test cleanup failed");
                }
                Err(e)
            }
            (Ok(_), Err(c)) => Err(c),
        }
    }

    async fn observe_counter(&self, name: &str) -> ExecResult<String> {
        let wait = pick_wait(self.settings.selftest_wait);
        debug!(container = %name, ?wait, "self-test waiting");
        tokio::time::sleep(wait).await;

        let logs = self.runtime.logs(name).await?;
        self.observer
            .notify(&format!(
                "Slept for {}s and retrieved logs: {}",
                wait.as_secs(),
                logs.trim_end()
            ))
            .await;
        Ok(logs)
    }
}

fn exchange_address(op: &Operation) -> ExecResult<&str> {
    op.exchange_address
        .as_deref()
        .ok_or(ExecutionError::Core(CoreError::MissingLabel(FILESERVER_IP)))
}

/// Uniform pick in `[min, max]`, at millisecond granularity.
fn pick_wait((min, max): (Duration, Duration)) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = (max.as_millis() as u64).max(lo);
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}
