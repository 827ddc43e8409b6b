//! Operations, tasks, offers, and task status.
//!
//! An [`Operation`] is the typed view of a task's labels. Tasks travel
//! through the queue and the transport in label form; they are decoded
//! into operations only when a decision has to be made, so a task with
//! broken labels surfaces as a [`CoreError`] at that point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::labels::{self, Labels};

/// Unique identifier for a task (monotonic, assigned by the scheduler).
pub type TaskId = String;

/// Hostname of a cluster host.
pub type HostName = String;

// ── Operations ─────────────────────────────────────────────────────

/// The kind of work an operation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    RunContainer,
    CheckpointContainer,
    RestoreContainer,
    GetLogs,
    #[serde(rename = "TEST_TASK")]
    SelfTest,
}

impl OperationKind {
    /// Wire value of the `TASK_TYPE` label.
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationKind::RunContainer => "RUN_CONTAINER",
            OperationKind::CheckpointContainer => "CHECKPOINT_CONTAINER",
            OperationKind::RestoreContainer => "RESTORE_CONTAINER",
            OperationKind::GetLogs => "GET_LOGS",
            OperationKind::SelfTest => "TEST_TASK",
        }
    }

    /// Whether the operation must run on a specific host.
    pub fn requires_target_host(&self) -> bool {
        matches!(
            self,
            OperationKind::CheckpointContainer
                | OperationKind::RestoreContainer
                | OperationKind::GetLogs
        )
    }

    /// Whether the operation talks to the exchange service.
    pub fn requires_exchange(&self) -> bool {
        matches!(
            self,
            OperationKind::CheckpointContainer | OperationKind::RestoreContainer
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUN_CONTAINER" => Ok(OperationKind::RunContainer),
            "CHECKPOINT_CONTAINER" => Ok(OperationKind::CheckpointContainer),
            "RESTORE_CONTAINER" => Ok(OperationKind::RestoreContainer),
            "GET_LOGS" => Ok(OperationKind::GetLogs),
            "TEST_TASK" => Ok(OperationKind::SelfTest),
            other => Err(CoreError::UnknownTaskType(other.to_string())),
        }
    }
}

/// Typed view of a task's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub container_name: String,
    /// Required for checkpoint, restore, and get-logs.
    pub target_host: Option<HostName>,
    /// Required for checkpoint and restore.
    pub exchange_address: Option<String>,
    /// Set once the scheduler has matched the task to an offer.
    pub accepted_host: Option<HostName>,
    pub image: Option<String>,
    pub command: Option<String>,
}

impl Operation {
    /// A bare operation with no optional fields set.
    pub fn new(kind: OperationKind, container_name: impl Into<String>) -> Self {
        Self {
            kind,
            container_name: container_name.into(),
            target_host: None,
            exchange_address: None,
            accepted_host: None,
            image: None,
            command: None,
        }
    }

    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    pub fn with_exchange(mut self, address: impl Into<String>) -> Self {
        self.exchange_address = Some(address.into());
        self
    }

    /// Decode an operation from task labels.
    ///
    /// Fails when `TASK_TYPE` or `CONTAINER_NAME` is missing, when the
    /// type is unknown, when the container name is not a valid Docker
    /// name, or when a label required by the type is absent.
    pub fn from_labels(labels: &Labels) -> CoreResult<Self> {
        let kind: OperationKind = labels.require(labels::TASK_TYPE)?.parse()?;
        let container_name = labels.require(labels::CONTAINER_NAME)?;
        if !is_valid_container_name(container_name) {
            return Err(CoreError::InvalidContainerName(container_name.to_string()));
        }
        let container_name = container_name.to_string();

        let target_host = if kind.requires_target_host() {
            Some(labels.require(labels::TARGET_HOST)?.to_string())
        } else {
            labels.get(labels::TARGET_HOST).map(str::to_string)
        };

        let exchange_address = if kind.requires_exchange() {
            Some(labels.require(labels::FILESERVER_IP)?.to_string())
        } else {
            labels.get(labels::FILESERVER_IP).map(str::to_string)
        };

        Ok(Self {
            kind,
            container_name,
            target_host,
            exchange_address,
            accepted_host: labels.get(labels::ACCEPTED_HOST).map(str::to_string),
            image: labels.get(labels::CONTAINER_IMAGE).map(str::to_string),
            command: labels.get(labels::CONTAINER_COMMAND).map(str::to_string),
        })
    }

    /// Encode the operation as task labels.
    pub fn to_labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.set(labels::TASK_TYPE, self.kind.as_label());
        labels.set(labels::CONTAINER_NAME, self.container_name.as_str());
        let optional = [
            (labels::FILESERVER_IP, &self.exchange_address),
            (labels::TARGET_HOST, &self.target_host),
            (labels::ACCEPTED_HOST, &self.accepted_host),
            (labels::CONTAINER_IMAGE, &self.image),
            (labels::CONTAINER_COMMAND, &self.command),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                labels.set(key, v.as_str());
            }
        }
        labels
    }
}

/// Docker's container name rule: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
///
/// Names end up in scratch paths on the hosts, so anything else
/// (separators, `..`, whitespace) is refused.
pub fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    }
}

// ── Resources & offers ─────────────────────────────────────────────

/// Scalar resource amounts (cpus, MiB of memory).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpus: f64,
    pub mem: f64,
}

impl Resources {
    pub fn new(cpus: f64, mem: f64) -> Self {
        Self { cpus, mem }
    }

    /// Whether `demand` fits entirely within these resources.
    pub fn covers(&self, demand: &Resources) -> bool {
        demand.cpus <= self.cpus && demand.mem <= self.mem
    }

    /// Subtract `demand`, clamping at zero.
    pub fn consume(&mut self, demand: &Resources) {
        self.cpus = (self.cpus - demand.cpus).max(0.0);
        self.mem = (self.mem - demand.mem).max(0.0);
    }

    /// Add `amount` back.
    pub fn release(&mut self, amount: &Resources) {
        self.cpus += amount.cpus;
        self.mem += amount.mem;
    }
}

/// A host's advertised spare capacity for one matching pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_id: String,
    pub host: HostName,
    pub resources: Resources,
}

// ── Tasks & status ─────────────────────────────────────────────────

/// Transport form of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub labels: Labels,
    pub resources: Resources,
}

impl TaskInfo {
    /// Decode this task's operation.
    pub fn operation(&self) -> CoreResult<Operation> {
        Operation::from_labels(&self.labels)
    }

    /// Container name label, if present (for logging malformed tasks).
    pub fn container_name(&self) -> Option<&str> {
        self.labels.get(labels::CONTAINER_NAME)
    }
}

/// Lifecycle state reported by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

/// Status update sent from an executor to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    /// Labels of the dispatched task, including `ACCEPTED_HOST`.
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation output (container logs for `GET_LOGS`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Whether a failure was transient.
    #[serde(default)]
    pub retriable: bool,
}

impl TaskStatus {
    pub fn running(task: &TaskInfo) -> Self {
        Self {
            task_id: task.task_id.clone(),
            state: TaskState::Running,
            labels: task.labels.clone(),
            message: None,
            data: None,
            retriable: false,
        }
    }

    pub fn finished(task: &TaskInfo, data: Option<String>) -> Self {
        Self {
            state: TaskState::Finished,
            data,
            ..Self::running(task)
        }
    }

    pub fn failed(task: &TaskInfo, message: impl Into<String>, retriable: bool) -> Self {
        Self {
            state: TaskState::Failed,
            message: Some(message.into()),
            retriable,
            ..Self::running(task)
        }
    }
}

/// Order in which the pending queue yields operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Most recently enqueued first.
    #[default]
    Lifo,
    /// Oldest first.
    Fifo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn operation_kind_round_trips_through_label_value() {
        for kind in [
            OperationKind::RunContainer,
            OperationKind::CheckpointContainer,
            OperationKind::RestoreContainer,
            OperationKind::GetLogs,
            OperationKind::SelfTest,
        ] {
            assert_eq!(kind.as_label().parse::<OperationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_task_type_is_rejected() {
        let l = labels(&[("TASK_TYPE", "MIGRATE"), ("CONTAINER_NAME", "web1")]);
        assert!(matches!(
            Operation::from_labels(&l),
            Err(CoreError::UnknownTaskType(t)) if t == "MIGRATE"
        ));
    }

    #[test]
    fn run_container_needs_no_target_host() {
        let l = labels(&[("TASK_TYPE", "RUN_CONTAINER"), ("CONTAINER_NAME", "web1")]);
        let op = Operation::from_labels(&l).unwrap();
        assert_eq!(op.kind, OperationKind::RunContainer);
        assert_eq!(op.target_host, None);
    }

    #[test]
    fn checkpoint_without_target_host_is_malformed() {
        let l = labels(&[
            ("TASK_TYPE", "CHECKPOINT_CONTAINER"),
            ("CONTAINER_NAME", "web1"),
            ("FILESERVER_IP", "http://exchange:3000"),
        ]);
        assert!(matches!(
            Operation::from_labels(&l),
            Err(CoreError::MissingLabel("TARGET_HOST"))
        ));
    }

    #[test]
    fn restore_without_exchange_is_malformed() {
        let l = labels(&[
            ("TASK_TYPE", "RESTORE_CONTAINER"),
            ("CONTAINER_NAME", "web1"),
            ("TARGET_HOST", "host-b"),
        ]);
        assert!(matches!(
            Operation::from_labels(&l),
            Err(CoreError::MissingLabel("FILESERVER_IP"))
        ));
    }

    #[test]
    fn missing_container_name_is_malformed() {
        let l = labels(&[("TASK_TYPE", "RUN_CONTAINER")]);
        assert!(matches!(
            Operation::from_labels(&l),
            Err(CoreError::MissingLabel("CONTAINER_NAME"))
        ));
    }

    #[test]
    fn container_name_must_follow_docker_rule() {
        for name in ["web1", "Web-1", "db_2.primary", "a"] {
            assert!(is_valid_container_name(name), "{name}");
        }
        for name in ["", "../etc", "a/b", ".hidden", "-x", "_x", "web 1", "..", "web1/"] {
            assert!(!is_valid_container_name(name), "{name}");
        }
    }

    #[test]
    fn path_like_container_name_is_malformed() {
        let l = labels(&[("TASK_TYPE", "RUN_CONTAINER"), ("CONTAINER_NAME", "../../srv")]);
        assert!(matches!(
            Operation::from_labels(&l),
            Err(CoreError::InvalidContainerName(n)) if n == "../../srv"
        ));
    }

    #[test]
    fn labels_encode_and_decode_operation() {
        let mut op = Operation::new(OperationKind::RestoreContainer, "web1")
            .with_target_host("host-b")
            .with_exchange("http://exchange:3000");
        op.accepted_host = Some("host-b".to_string());

        let decoded = Operation::from_labels(&op.to_labels()).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn resources_cover_and_consume() {
        let mut offer = Resources::new(1.0, 256.0);
        let demand = Resources::new(0.5, 128.0);
        assert!(offer.covers(&demand));
        offer.consume(&demand);
        offer.consume(&demand);
        assert_eq!(offer, Resources::new(0.0, 0.0));
        assert!(!offer.covers(&demand));
    }

    #[test]
    fn status_constructors_keep_task_labels() {
        let task = TaskInfo {
            task_id: "7".to_string(),
            name: "hoist-task-7".to_string(),
            labels: labels(&[("TASK_TYPE", "GET_LOGS"), ("CONTAINER_NAME", "web1")]),
            resources: Resources::new(0.5, 128.0),
        };
        let status = TaskStatus::failed(&task, "exchange unreachable", true);
        assert_eq!(status.state, TaskState::Failed);
        assert!(status.state.is_terminal());
        assert!(status.retriable);
        assert_eq!(status.labels, task.labels);
    }

    #[test]
    fn queue_order_parses_lowercase() {
        let order: QueueOrder = serde_json::from_str("\"fifo\"").unwrap();
        assert_eq!(order, QueueOrder::Fifo);
        assert_eq!(QueueOrder::default(), QueueOrder::Lifo);
    }
}
