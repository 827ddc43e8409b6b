//! Admission engine — matches queued tasks against a single offer.
//!
//! For each offer the matcher pops candidates from the pending queue while
//! the remaining capacity still covers one more task, and asks
//! [`evaluate`] for a verdict:
//!
//! | verdict | effect |
//! |---|---|
//! | `Admit` | stamp `ACCEPTED_HOST`, consume capacity, dispatch |
//! | `Requeue` | hand the task back to the queue, stop filling this offer |
//! | `Reject` | discard the malformed task, keep filling this offer |
//!
//! Affinity rules:
//!
//! - `RUN_CONTAINER`, `TEST_TASK` — any host.
//! - `RESTORE_CONTAINER` — the container has no placement, and the offer
//!   comes from the target host.
//! - `CHECKPOINT_CONTAINER`, `GET_LOGS` — the offer comes from the target
//!   host, and the container is placed on that same host.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error};

use hoist_core::labels::ACCEPTED_HOST;
use hoist_core::{CoreError, Offer, Operation, OperationKind, Resources, TaskId, TaskInfo};
use hoist_state::{PendingQueue, PlacementTracker};

/// Verdict for one candidate task on one offer.
#[derive(Debug)]
pub enum Admission {
    Admit,
    Requeue(RequeueReason),
    Reject(CoreError),
}

/// Why an otherwise valid task cannot run on this offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequeueReason {
    /// The offer is not from the task's target host.
    WrongHost { target: String, offered: String },
    /// Restore of a container that is still placed somewhere.
    StillPlaced { host: String },
    /// Checkpoint / logs for a container not placed on the offering host.
    NotPlacedHere { placed: Option<String> },
}

impl fmt::Display for RequeueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequeueReason::WrongHost { target, offered } => {
                write!(f, "target host {target} does not match offer from {offered}")
            }
            RequeueReason::StillPlaced { host } => {
                write!(f, "container is already running on {host}")
            }
            RequeueReason::NotPlacedHere { placed: Some(host) } => {
                write!(f, "container is running on {host}")
            }
            RequeueReason::NotPlacedHere { placed: None } => {
                write!(f, "container is not running anywhere")
            }
        }
    }
}

/// A task discarded because its labels could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscardedTask {
    pub task_id: TaskId,
    pub reason: String,
}

/// Result of matching one offer.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatch {
    pub offer_id: String,
    pub host: String,
    /// Admitted tasks, each carrying `ACCEPTED_HOST`.
    pub tasks: Vec<TaskInfo>,
    pub discarded: Vec<DiscardedTask>,
}

/// Decide whether `task` may run on an offer from `offered_host`.
pub fn evaluate(task: &TaskInfo, offered_host: &str, tracker: &PlacementTracker) -> Admission {
    let op = match Operation::from_labels(&task.labels) {
        Ok(op) => op,
        Err(e) => return Admission::Reject(e),
    };
    evaluate_operation(&op, offered_host, tracker)
}

/// Affinity rules on an already decoded operation.
pub fn evaluate_operation(
    op: &Operation,
    offered_host: &str,
    tracker: &PlacementTracker,
) -> Admission {
    let placed = tracker.lookup(&op.container_name);

    match op.kind {
        OperationKind::RunContainer | OperationKind::SelfTest => Admission::Admit,
        OperationKind::RestoreContainer => {
            if let Some(host) = placed {
                return Admission::Requeue(RequeueReason::StillPlaced {
                    host: host.to_string(),
                });
            }
            match on_target_host(op, offered_host) {
                Ok(()) => Admission::Admit,
                Err(reason) => Admission::Requeue(reason),
            }
        }
        OperationKind::CheckpointContainer | OperationKind::GetLogs => {
            if let Err(reason) = on_target_host(op, offered_host) {
                return Admission::Requeue(reason);
            }
            if placed == Some(offered_host) {
                Admission::Admit
            } else {
                Admission::Requeue(RequeueReason::NotPlacedHere {
                    placed: placed.map(str::to_string),
                })
            }
        }
    }
}

fn on_target_host(op: &Operation, offered_host: &str) -> Result<(), RequeueReason> {
    match op.target_host.as_deref() {
        Some(target) if target == offered_host => Ok(()),
        target => Err(RequeueReason::WrongHost {
            target: target.unwrap_or_default().to_string(),
            offered: offered_host.to_string(),
        }),
    }
}

/// Fill one offer from the queue.
///
/// Never admits more than the offer can hold: a candidate is only popped
/// while `remaining` covers `demand`.
pub fn match_offer(
    offer: &Offer,
    demand: &Resources,
    queue: &mut PendingQueue,
    tracker: &PlacementTracker,
) -> Dispatch {
    let mut remaining = offer.resources;
    let mut tasks = Vec::new();
    let mut discarded = Vec::new();

    while remaining.covers(demand) {
        let Some(mut task) = queue.pop() else {
            break;
        };

        match evaluate(&task, &offer.host, tracker) {
            Admission::Admit => {
                task.labels.set(ACCEPTED_HOST, offer.host.as_str());
                remaining.consume(demand);
                debug!(
                    task = %task.task_id,
                    offer = %offer.offer_id,
                    host = %offer.host,
                    "prepared task for launch"
                );
                tasks.push(task);
            }
            Admission::Requeue(reason) => {
                debug!(
                    task = %task.task_id,
                    host = %offer.host,
                    %reason,
                    "task not admissible on this offer, returned to queue"
                );
                queue.requeue(task);
                break;
            }
            Admission::Reject(e) => {
                error!(
                    task = %task.task_id,
                    container = task.container_name().unwrap_or("<none>"),
                    error = %e,
                    "malformed task, discarding"
                );
                discarded.push(DiscardedTask {
                    task_id: task.task_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Dispatch {
        offer_id: offer.offer_id.clone(),
        host: offer.host.clone(),
        tasks,
        discarded,
    }
}
