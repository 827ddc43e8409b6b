//! Dispatched tasks awaiting their first status.
//!
//! An admitted task leaves the pending queue the moment the offer is
//! answered, before any agent has seen it. It is held here until the agent
//! reports `RUNNING`. An entry still unacknowledged when its lease runs out
//! is handed back to the caller for requeueing; acknowledged entries stay
//! until the terminal status arrives.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use hoist_core::{HostName, TaskId, TaskInfo};

#[derive(Debug, Clone)]
pub struct Dispatched {
    pub task: TaskInfo,
    pub host: HostName,
    /// Reclaim time if no `RUNNING` status arrives first.
    pub deadline: Instant,
    pub acknowledged: bool,
}

#[derive(Debug)]
pub struct DispatchTable {
    entries: HashMap<TaskId, Dispatched>,
    lease: Duration,
}

impl DispatchTable {
    pub fn new(lease: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lease,
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Record `task` as handed to `host` at `now`.
    pub fn insert(&mut self, task: TaskInfo, host: &str, now: Instant) {
        debug!(task = %task.task_id, %host, lease = ?self.lease, "task dispatched");
        self.entries.insert(
            task.task_id.clone(),
            Dispatched {
                task,
                host: host.to_string(),
                deadline: now + self.lease,
                acknowledged: false,
            },
        );
    }

    /// Record `task` as already running on `host`.
    pub fn insert_acknowledged(&mut self, task: TaskInfo, host: &str, now: Instant) {
        let id = task.task_id.clone();
        self.insert(task, host, now);
        self.acknowledge(&id);
    }

    /// Mark `task_id` as running. Returns false for an unknown id.
    pub fn acknowledge(&mut self, task_id: &str) -> bool {
        match self.entries.get_mut(task_id) {
            Some(entry) => {
                entry.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Drop `task_id` once it has reached a terminal state.
    pub fn complete(&mut self, task_id: &str) -> Option<Dispatched> {
        self.entries.remove(task_id)
    }

    /// Remove and return every unacknowledged entry whose lease ran out by
    /// `now`, earliest deadline first.
    pub fn expired(&mut self, now: Instant) -> Vec<Dispatched> {
        let ids: Vec<TaskId> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.acknowledged && e.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let mut expired: Vec<Dispatched> = ids
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        expired.sort_by_key(|e| e.deadline);
        expired
    }

    pub fn get(&self, task_id: &str) -> Option<&Dispatched> {
        self.entries.get(task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dispatched> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::{Labels, Resources};

    fn task(id: u64) -> TaskInfo {
        TaskInfo {
            task_id: id.to_string(),
            name: format!("hoist-task-{id}"),
            labels: Labels::new(),
            resources: Resources::new(0.5, 128.0),
        }
    }

    #[test]
    fn unacknowledged_entry_expires_after_lease() {
        let mut table = DispatchTable::new(Duration::from_secs(10));
        let start = Instant::now();
        table.insert(task(1), "host-a", start);

        assert!(table.expired(start + Duration::from_secs(9)).is_empty());
        let expired = table.expired(start + Duration::from_secs(10));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].task.task_id, "1");
        assert_eq!(expired[0].host, "host-a");
        assert!(table.is_empty());
    }

    #[test]
    fn acknowledged_entry_never_expires() {
        let mut table = DispatchTable::new(Duration::ZERO);
        let start = Instant::now();
        table.insert(task(1), "host-a", start);
        assert!(table.acknowledge("1"));
        assert!(!table.acknowledge("2"));

        assert!(table.expired(start + Duration::from_secs(3600)).is_empty());
        assert_eq!(table.len(), 1);
        assert!(table.complete("1").is_some());
        assert!(table.complete("1").is_none());
    }

    #[test]
    fn expired_is_ordered_by_deadline() {
        let mut table = DispatchTable::new(Duration::from_secs(1));
        let start = Instant::now();
        table.insert(task(2), "host-a", start + Duration::from_millis(5));
        table.insert(task(1), "host-b", start);
        table.insert_acknowledged(task(3), "host-a", start);

        let ids: Vec<_> = table
            .expired(start + Duration::from_secs(2))
            .into_iter()
            .map(|e| e.task.task_id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(table.get("3").is_some_and(|e| e.acknowledged));
    }
}
