//! Pending operation queue.
//!
//! Tasks wait here, in label form, until an offer admits them. The pop
//! order is configurable; a task handed back with [`PendingQueue::requeue`]
//! goes back to the position it was popped from, so it is the next
//! candidate again.

use std::collections::VecDeque;

use hoist_core::{QueueOrder, TaskInfo};

#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Oldest at the front.
    tasks: VecDeque<TaskInfo>,
    order: QueueOrder,
}

impl PendingQueue {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            tasks: VecDeque::new(),
            order,
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    pub fn push(&mut self, task: TaskInfo) {
        self.tasks.push_back(task);
    }

    /// Next candidate according to the queue order.
    pub fn pop(&mut self) -> Option<TaskInfo> {
        match self.order {
            QueueOrder::Lifo => self.tasks.pop_back(),
            QueueOrder::Fifo => self.tasks.pop_front(),
        }
    }

    /// Return a popped task to the head of the pop order.
    pub fn requeue(&mut self, task: TaskInfo) {
        match self.order {
            QueueOrder::Lifo => self.tasks.push_back(task),
            QueueOrder::Fifo => self.tasks.push_front(task),
        }
    }

    /// Return tasks popped earlier, given in the order they were popped, so
    /// that they come out again in that same order before anything else.
    pub fn requeue_all(&mut self, tasks: Vec<TaskInfo>) {
        for task in tasks.into_iter().rev() {
            self.requeue(task);
        }
    }

    /// Take `task_id` out of the queue wherever it sits.
    pub fn remove(&mut self, task_id: &str) -> Option<TaskInfo> {
        let pos = self.tasks.iter().position(|t| t.task_id == task_id)?;
        self.tasks.remove(pos)
    }

    /// Queued tasks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TaskInfo> {
        self.tasks.iter()
    }

    /// Copy of the queue, oldest first.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
