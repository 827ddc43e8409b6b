//! Executor error types.

use std::time::Duration;

use thiserror::Error;

use hoist_core::CoreError;

/// Errors that fail a single operation.
///
/// None of these terminate the executor; they end up in the `FAILED`
/// status of the operation that raised them.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected inspect output for {name}: {reason}")]
    Inspect { name: String, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{url} unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("{url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("{url} answered {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("exchange returned container {found}, expected {expected}")]
    EnvelopeMismatch { expected: String, found: String },

    /// Shipping a checkpoint failed, and restarting the container from
    /// that checkpoint on the same host failed too.
    #[error("{cause}; resuming {name} locally failed: {resume}")]
    ResumeFailed {
        name: String,
        cause: Box<ExecutionError>,
        resume: Box<ExecutionError>,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExecutionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Network trouble and 5xx answers are transient; command failures,
    /// bad envelopes, and 4xx answers are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ExecutionError::Unreachable { .. } | ExecutionError::Timeout { .. } => true,
            ExecutionError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type ExecResult<T> = Result<T, ExecutionError>;
