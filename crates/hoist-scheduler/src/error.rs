//! Scheduler error types.

use thiserror::Error;

use hoist_core::CoreError;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{name} has already been launched on {host}")]
    AlreadyPlaced { name: String, host: String },

    #[error("{name} already has a launch pending (task {task_id})")]
    LaunchPending { name: String, task_id: String },

    #[error("{0} has not been launched yet")]
    NotPlaced(String),

    #[error("malformed task status for task {task_id}: {source}")]
    MalformedStatus {
        task_id: String,
        #[source]
        source: CoreError,
    },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
