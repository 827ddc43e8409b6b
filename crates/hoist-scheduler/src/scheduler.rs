//! Scheduler — owner of the pending queue and the placement tracker.
//!
//! Two independent paths reach the scheduler: the admin surface enqueues
//! operations, and the cluster transport delivers offers and status
//! updates. Both go through the same `Mutex<SchedulerState>`, which is the
//! only lock in the scheduler. An offer batch is matched while holding it,
//! so a task can never be admitted to two offers.
//!
//! Admitted tasks sit in the dispatch table until their agent reports
//! `RUNNING`. When the offer reply never reaches the agent, that report
//! never comes; the lease runs out and the next offer batch puts the task
//! back in the queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use hoist_core::labels::ACCEPTED_HOST;
use hoist_core::*;
use hoist_state::{DispatchTable, PendingQueue, PlacementTracker};

use crate::admission::{self, Dispatch};
use crate::error::{SchedulerError, SchedulerResult};

/// Counters exposed on the admin surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub tasks_enqueued: u64,
    pub tasks_launched: u64,
    pub tasks_finished: u64,
    pub tasks_failed: u64,
    pub tasks_discarded: u64,
    /// Dispatched tasks returned to the queue after their lease ran out.
    pub tasks_reclaimed: u64,
    pub pending: usize,
    /// Admitted tasks whose terminal status has not arrived yet.
    pub dispatched: usize,
    pub placed_containers: usize,
}

struct SchedulerState {
    queue: PendingQueue,
    dispatched: DispatchTable,
    tracker: PlacementTracker,
    /// Latest `GET_LOGS` output per container.
    logs: HashMap<String, String>,
    next_task_id: u64,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn push(&mut self, labels: Labels, demand: Resources) -> TaskInfo {
        let id = self.next_task_id;
        self.next_task_id += 1;

        let task = TaskInfo {
            task_id: id.to_string(),
            name: format!("hoist-task-{id}"),
            labels,
            resources: demand,
        };
        self.queue.push(task.clone());
        self.stats.tasks_enqueued += 1;
        debug!(task = %task.task_id, pending = self.queue.len(), "task queued");
        task
    }

    /// Requeue every dispatched task whose lease ran out unacknowledged.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired = self.dispatched.expired(now);
        if expired.is_empty() {
            return;
        }
        let mut tasks = Vec::with_capacity(expired.len());
        for entry in expired {
            warn!(
                task = %entry.task.task_id,
                host = %entry.host,
                lease = ?self.dispatched.lease(),
                "no RUNNING status within lease, returning task to queue"
            );
            let mut task = entry.task;
            task.labels.remove(ACCEPTED_HOST);
            tasks.push(task);
        }
        self.stats.tasks_reclaimed += tasks.len() as u64;
        self.queue.requeue_all(tasks);
    }

    /// Forget `task_id` after a terminal status, wherever it is held.
    fn retire(&mut self, task_id: &str) {
        if self.dispatched.complete(task_id).is_none() && self.queue.remove(task_id).is_some() {
            debug!(task = %task_id, "terminal status for a reclaimed task, dropped from queue");
        }
    }

    /// Queued or dispatched `RUN_CONTAINER` for `name`.
    fn pending_run(&self, name: &str) -> Option<&TaskInfo> {
        self.queue
            .iter()
            .chain(self.dispatched.iter().map(|d| &d.task))
            .find(|task| {
                task.operation().is_ok_and(|op| {
                    op.kind == OperationKind::RunContainer && op.container_name == name
                })
            })
    }
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    demand: Resources,
    exchange_url: String,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let lease = config.dispatch_lease().unwrap_or_else(|e| {
            warn!(error = %e, "invalid dispatch lease, using 30s");
            Duration::from_secs(30)
        });
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                queue: PendingQueue::new(config.queue_order),
                dispatched: DispatchTable::new(lease),
                tracker: PlacementTracker::new(),
                logs: HashMap::new(),
                next_task_id: 0,
                stats: SchedulerStats::default(),
            })),
            demand: config.task_demand(),
            exchange_url: config.exchange_url.clone(),
        }
    }

    /// Fixed demand of every task.
    pub fn demand(&self) -> Resources {
        self.demand
    }

    // ── Enqueue ─────────────────────────────────────────────────────

    /// Queue an operation without placement checks.
    ///
    /// The exchange address defaults to the configured exchange.
    pub async fn enqueue(&self, op: Operation) -> TaskInfo {
        let labels = self.task_labels(op);
        self.enqueue_labels(labels).await
    }

    /// Queue a raw label set. The labels are only decoded at matching time,
    /// so a malformed set is accepted here and discarded there.
    pub async fn enqueue_labels(&self, labels: Labels) -> TaskInfo {
        self.state.lock().await.push(labels, self.demand)
    }

    /// Queue a `RUN_CONTAINER`; refused when `name` is already placed or
    /// already has a launch queued or in flight.
    pub async fn run_container(&self, name: &str) -> SchedulerResult<TaskInfo> {
        let labels = self.task_labels(Operation::new(OperationKind::RunContainer, name));

        let mut state = self.state.lock().await;
        if let Some(host) = state.tracker.lookup(name) {
            info!(container = %name, %host, "container already launched");
            return Err(SchedulerError::AlreadyPlaced {
                name: name.to_string(),
                host: host.to_string(),
            });
        }
        if let Some(task) = state.pending_run(name) {
            info!(container = %name, task = %task.task_id, "container launch already pending");
            return Err(SchedulerError::LaunchPending {
                name: name.to_string(),
                task_id: task.task_id.clone(),
            });
        }
        Ok(state.push(labels, self.demand))
    }

    /// Queue a `CHECKPOINT_CONTAINER` targeting the container's current host.
    pub async fn checkpoint_container(&self, name: &str) -> SchedulerResult<TaskInfo> {
        let host = self.require_placement(name).await?;
        Ok(self
            .enqueue(Operation::new(OperationKind::CheckpointContainer, name).with_target_host(host))
            .await)
    }

    /// Queue a `RESTORE_CONTAINER` onto `target_host`.
    ///
    /// Not checked against the tracker: a restore queued right behind its
    /// checkpoint simply waits in the queue until the checkpoint finishes.
    pub async fn restore_container(&self, name: &str, target_host: &str) -> TaskInfo {
        self.enqueue(
            Operation::new(OperationKind::RestoreContainer, name).with_target_host(target_host),
        )
        .await
    }

    /// Queue a `GET_LOGS` targeting the container's current host.
    pub async fn get_logs(&self, name: &str) -> SchedulerResult<TaskInfo> {
        let host = self.require_placement(name).await?;
        Ok(self
            .enqueue(Operation::new(OperationKind::GetLogs, name).with_target_host(host))
            .await)
    }

    /// Queue a self-test run.
    pub async fn self_test(&self, name: &str) -> TaskInfo {
        self.enqueue(Operation::new(OperationKind::SelfTest, name))
            .await
    }

    /// Labels for `op`, with the exchange address defaulted.
    fn task_labels(&self, mut op: Operation) -> Labels {
        if op.exchange_address.is_none() {
            op.exchange_address = Some(self.exchange_url.clone());
        }
        info!(kind = %op.kind, container = %op.container_name, "generating task");
        op.to_labels()
    }

    // ── Offers ──────────────────────────────────────────────────────

    /// Match a batch of offers against the queue.
    ///
    /// Returns one [`Dispatch`] per offer, in input order. A malformed task
    /// is discarded on its own; the rest of the batch is unaffected.
    /// Expired dispatches are requeued first, so they compete for this
    /// batch like any other pending task.
    pub async fn resource_offers(&self, offers: Vec<Offer>) -> Vec<Dispatch> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Instant::now();
        state.reclaim_expired(now);

        let mut dispatches = Vec::with_capacity(offers.len());
        for offer in &offers {
            let dispatch =
                admission::match_offer(offer, &self.demand, &mut state.queue, &state.tracker);

            state.stats.tasks_launched += dispatch.tasks.len() as u64;
            state.stats.tasks_discarded += dispatch.discarded.len() as u64;
            for task in &dispatch.tasks {
                state.dispatched.insert(task.clone(), &offer.host, now);
            }

            info!(
                offer = %offer.offer_id,
                host = %offer.host,
                tasks = dispatch.tasks.len(),
                discarded = dispatch.discarded.len(),
                pending = state.queue.len(),
                "launching tasks for offer"
            );
            dispatches.push(dispatch);
        }
        dispatches
    }

    /// Match a single offer.
    pub async fn resource_offer(&self, offer: Offer) -> Dispatch {
        let mut dispatches = self.resource_offers(vec![offer]).await;
        // One offer in, one dispatch out.
        dispatches.remove(0)
    }

    // ── Status ──────────────────────────────────────────────────────

    /// Apply an executor status update.
    ///
    /// Placement only changes on `Finished`: run and restore place the
    /// container on the accepted host, checkpoint clears it. `Failed`
    /// leaves the tracker untouched.
    ///
    /// `Running` acknowledges the dispatch. If the task was already
    /// reclaimed and is still waiting in the queue, it is taken back out.
    pub async fn status_update(&self, status: TaskStatus) -> SchedulerResult<()> {
        debug!(task = %status.task_id, state = ?status.state, "status update");

        match status.state {
            TaskState::Running => {
                let mut state = self.state.lock().await;
                if !state.dispatched.acknowledge(&status.task_id) {
                    if let Some(mut task) = state.queue.remove(&status.task_id) {
                        let host = status.labels.get(ACCEPTED_HOST).unwrap_or_default();
                        info!(task = %status.task_id, %host, "late RUNNING status, task taken back from queue");
                        task.labels.set(ACCEPTED_HOST, host);
                        state.dispatched.insert_acknowledged(task, host, Instant::now());
                    }
                }
                Ok(())
            }
            TaskState::Failed => {
                warn!(
                    task = %status.task_id,
                    message = status.message.as_deref().unwrap_or(""),
                    retriable = status.retriable,
                    "task failed, placement unchanged"
                );
                let mut state = self.state.lock().await;
                state.retire(&status.task_id);
                state.stats.tasks_failed += 1;
                Ok(())
            }
            TaskState::Finished => {
                self.state.lock().await.retire(&status.task_id);
                self.apply_finished(status).await
            }
        }
    }

    async fn apply_finished(&self, status: TaskStatus) -> SchedulerResult<()> {
        let malformed = |source| SchedulerError::MalformedStatus {
            task_id: status.task_id.clone(),
            source,
        };
        let op = Operation::from_labels(&status.labels).map_err(malformed)?;
        let accepted_host = status.labels.require(ACCEPTED_HOST).map_err(malformed)?;

        let mut state = self.state.lock().await;
        state.stats.tasks_finished += 1;

        match op.kind {
            OperationKind::RunContainer | OperationKind::RestoreContainer => {
                state.tracker.set(&op.container_name, accepted_host);
                info!(container = %op.container_name, host = %accepted_host, kind = %op.kind, "container placed");
            }
            OperationKind::CheckpointContainer => {
                state.tracker.clear(&op.container_name);
                info!(container = %op.container_name, from = %accepted_host, "container checkpointed to exchange");
            }
            OperationKind::GetLogs => {
                let output = status.data.unwrap_or_default();
                debug!(container = %op.container_name, bytes = output.len(), "logs received");
                state.logs.insert(op.container_name, output);
            }
            OperationKind::SelfTest => {
                info!(container = %op.container_name, host = %accepted_host, "self-test finished");
            }
        }
        Ok(())
    }

    // ── Views ───────────────────────────────────────────────────────

    /// Host currently running `name`.
    pub async fn placement(&self, name: &str) -> Option<String> {
        self.state.lock().await.tracker.lookup(name).map(str::to_string)
    }

    pub async fn placements(&self) -> BTreeMap<String, String> {
        self.state.lock().await.tracker.snapshot()
    }

    /// Pending tasks, oldest first.
    pub async fn queue_snapshot(&self) -> Vec<TaskInfo> {
        self.state.lock().await.queue.snapshot()
    }

    /// Latest logs fetched for `name`.
    pub async fn logs(&self, name: &str) -> Option<String> {
        self.state.lock().await.logs.get(name).cloned()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().await;
        SchedulerStats {
            pending: state.queue.len(),
            dispatched: state.dispatched.len(),
            placed_containers: state.tracker.len(),
            ..state.stats.clone()
        }
    }

    async fn require_placement(&self, name: &str) -> SchedulerResult<String> {
        self.placement(name).await.ok_or_else(|| {
            error!(container = %name, "container has not been launched yet");
            SchedulerError::NotPlaced(name.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            exchange_url: "http://exchange:3000".to_string(),
            ..SchedulerConfig::default()
        }
    }

    /// Config whose dispatches expire as soon as they are made.
    fn zero_lease_config() -> SchedulerConfig {
        SchedulerConfig {
            dispatch_lease: "0s".to_string(),
            ..test_config()
        }
    }

    fn offer(host: &str, cpus: f64, mem: f64) -> Offer {
        Offer {
            offer_id: format!("offer-{host}"),
            host: host.to_string(),
            resources: Resources::new(cpus, mem),
        }
    }

    fn finished(task: &TaskInfo) -> TaskStatus {
        TaskStatus::finished(task, None)
    }

    #[tokio::test]
    async fn scheduler_starts_empty() {
        let scheduler = Scheduler::new(&test_config());
        assert!(scheduler.queue_snapshot().await.is_empty());
        assert!(scheduler.placements().await.is_empty());
        assert_eq!(scheduler.stats().await, SchedulerStats::default());
    }

    #[tokio::test]
    async fn enqueue_assigns_monotonic_ids_and_exchange() {
        let scheduler = Scheduler::new(&test_config());
        let first = scheduler.self_test("canary").await;
        let second = scheduler.run_container("web1").await.unwrap();

        assert_eq!(first.task_id, "0");
        assert_eq!(second.task_id, "1");
        assert_eq!(second.name, "hoist-task-1");
        let op = second.operation().unwrap();
        assert_eq!(op.exchange_address.as_deref(), Some("http://exchange:3000"));
        assert_eq!(second.resources, Resources::new(0.5, 128.0));
    }

    #[tokio::test]
    async fn run_is_refused_for_placed_container() {
        let scheduler = Scheduler::new(&test_config());
        let task = scheduler.run_container("web1").await.unwrap();
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler.status_update(finished(&dispatch.tasks[0])).await.unwrap();
        assert_eq!(dispatch.tasks[0].task_id, task.task_id);

        assert!(matches!(
            scheduler.run_container("web1").await,
            Err(SchedulerError::AlreadyPlaced { host, .. }) if host == "host-a"
        ));
    }

    #[tokio::test]
    async fn run_is_refused_while_launch_pending() {
        let scheduler = Scheduler::new(&test_config());
        let first = scheduler.run_container("web1").await.unwrap();

        assert!(matches!(
            scheduler.run_container("web1").await,
            Err(SchedulerError::LaunchPending { task_id, .. }) if task_id == first.task_id
        ));
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        assert_eq!(dispatch.tasks.len(), 1);
        assert!(matches!(
            scheduler.run_container("web1").await,
            Err(SchedulerError::LaunchPending { .. })
        ));
        // Another name is unaffected.
        scheduler.run_container("web2").await.unwrap();

        scheduler
            .status_update(TaskStatus::failed(&dispatch.tasks[0], "image pull failed", false))
            .await
            .unwrap();
        let retry = scheduler.run_container("web1").await.unwrap();
        assert_ne!(retry.task_id, first.task_id);
        assert_eq!(scheduler.stats().await.tasks_enqueued, 3);
    }

    #[tokio::test]
    async fn unanswered_dispatch_is_matchable_again() {
        let scheduler = Scheduler::new(&zero_lease_config());
        let task = scheduler.run_container("web1").await.unwrap();

        // The reply to host-a is lost; host-a never reports.
        let lost = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        assert_eq!(lost.tasks.len(), 1);
        assert!(scheduler.queue_snapshot().await.is_empty());

        let again = scheduler.resource_offer(offer("host-b", 1.0, 512.0)).await;
        assert_eq!(again.tasks.len(), 1);
        assert_eq!(again.tasks[0].task_id, task.task_id);
        assert_eq!(again.tasks[0].labels.get(ACCEPTED_HOST), Some("host-b"));

        scheduler.status_update(finished(&again.tasks[0])).await.unwrap();
        assert_eq!(scheduler.placement("web1").await.as_deref(), Some("host-b"));
        let stats = scheduler.stats().await;
        assert_eq!(stats.tasks_reclaimed, 1);
        assert_eq!(stats.tasks_launched, 2);
        assert_eq!(stats.dispatched, 0);
    }

    #[tokio::test]
    async fn dispatch_within_lease_is_not_reclaimed() {
        let scheduler = Scheduler::new(&test_config());
        scheduler.run_container("web1").await.unwrap();
        scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;

        let next = scheduler.resource_offer(offer("host-b", 1.0, 512.0)).await;
        assert!(next.tasks.is_empty());
        let stats = scheduler.stats().await;
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.tasks_reclaimed, 0);
    }

    #[tokio::test]
    async fn running_status_holds_the_dispatch() {
        let scheduler = Scheduler::new(&zero_lease_config());
        scheduler.run_container("web1").await.unwrap();
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler
            .status_update(TaskStatus::running(&dispatch.tasks[0]))
            .await
            .unwrap();

        let next = scheduler.resource_offer(offer("host-b", 1.0, 512.0)).await;
        assert!(next.tasks.is_empty());
        assert_eq!(scheduler.stats().await.dispatched, 1);

        scheduler.status_update(finished(&dispatch.tasks[0])).await.unwrap();
        let stats = scheduler.stats().await;
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.tasks_reclaimed, 0);
    }

    #[tokio::test]
    async fn late_running_status_takes_task_back_from_queue() {
        let scheduler = Scheduler::new(&zero_lease_config());
        scheduler.run_container("web1").await.unwrap();
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;

        // An empty offer only reclaims.
        scheduler.resource_offer(offer("host-b", 0.0, 0.0)).await;
        assert_eq!(scheduler.queue_snapshot().await.len(), 1);

        scheduler
            .status_update(TaskStatus::running(&dispatch.tasks[0]))
            .await
            .unwrap();
        assert!(scheduler.queue_snapshot().await.is_empty());
        assert_eq!(scheduler.stats().await.dispatched, 1);

        let next = scheduler.resource_offer(offer("host-b", 1.0, 512.0)).await;
        assert!(next.tasks.is_empty());
        scheduler.status_update(finished(&dispatch.tasks[0])).await.unwrap();
        assert_eq!(scheduler.placement("web1").await.as_deref(), Some("host-a"));
    }

    #[tokio::test]
    async fn checkpoint_and_logs_require_placement() {
        let scheduler = Scheduler::new(&test_config());
        assert!(matches!(
            scheduler.checkpoint_container("web1").await,
            Err(SchedulerError::NotPlaced(_))
        ));
        assert!(matches!(
            scheduler.get_logs("web1").await,
            Err(SchedulerError::NotPlaced(_))
        ));
        assert!(scheduler.queue_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn running_status_does_not_place() {
        let scheduler = Scheduler::new(&test_config());
        scheduler.run_container("web1").await.unwrap();
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;

        scheduler
            .status_update(TaskStatus::running(&dispatch.tasks[0]))
            .await
            .unwrap();
        assert_eq!(scheduler.placement("web1").await, None);
    }

    #[tokio::test]
    async fn failed_status_leaves_placement() {
        let scheduler = Scheduler::new(&test_config());
        scheduler.run_container("web1").await.unwrap();
        let run = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler.status_update(finished(&run.tasks[0])).await.unwrap();

        scheduler.checkpoint_container("web1").await.unwrap();
        let cp = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler
            .status_update(TaskStatus::failed(&cp.tasks[0], "upload rejected", false))
            .await
            .unwrap();

        assert_eq!(scheduler.placement("web1").await.as_deref(), Some("host-a"));
        assert_eq!(scheduler.stats().await.tasks_failed, 1);
    }

    #[tokio::test]
    async fn finished_status_without_accepted_host_is_malformed() {
        let scheduler = Scheduler::new(&test_config());
        let task = scheduler.run_container("web1").await.unwrap();

        let result = scheduler.status_update(finished(&task)).await;
        assert!(matches!(
            result,
            Err(SchedulerError::MalformedStatus { .. })
        ));
        assert!(scheduler.placements().await.is_empty());
    }

    #[tokio::test]
    async fn logs_are_recorded() {
        let scheduler = Scheduler::new(&test_config());
        scheduler.run_container("web1").await.unwrap();
        let run = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler.status_update(finished(&run.tasks[0])).await.unwrap();

        scheduler.get_logs("web1").await.unwrap();
        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        assert_eq!(dispatch.tasks.len(), 1);
        scheduler
            .status_update(TaskStatus::finished(
                &dispatch.tasks[0],
                Some("web1: 0\nweb1: 1\n".to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(
            scheduler.logs("web1").await.as_deref(),
            Some("web1: 0\nweb1: 1\n")
        );
        assert_eq!(scheduler.placement("web1").await.as_deref(), Some("host-a"));
    }

    #[tokio::test]
    async fn stats_track_lifecycle() {
        let scheduler = Scheduler::new(&test_config());
        scheduler.run_container("a").await.unwrap();
        scheduler.run_container("b").await.unwrap();
        scheduler
            .enqueue_labels([("TASK_TYPE", "RUN_CONTAINER")].into_iter().collect())
            .await;

        let dispatch = scheduler.resource_offer(offer("host-a", 1.0, 512.0)).await;
        scheduler.status_update(finished(&dispatch.tasks[0])).await.unwrap();

        let stats = scheduler.stats().await;
        assert_eq!(stats.tasks_enqueued, 3);
        assert_eq!(stats.tasks_launched, 2);
        assert_eq!(stats.tasks_discarded, 1);
        assert_eq!(stats.tasks_finished, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.placed_containers, 1);
    }
}
