//! Status reporting seam between the executor and the cluster transport.

use async_trait::async_trait;
use tokio::sync::mpsc;

use hoist_core::TaskStatus;

/// Delivers task statuses to the scheduler.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, status: TaskStatus) -> anyhow::Result<()>;
}

/// In-process delivery, used when scheduler and executor share a process.
#[async_trait]
impl StatusReporter for mpsc::UnboundedSender<TaskStatus> {
    async fn report(&self, status: TaskStatus) -> anyhow::Result<()> {
        self.send(status)
            .map_err(|_| anyhow::anyhow!("status receiver dropped"))
    }
}
