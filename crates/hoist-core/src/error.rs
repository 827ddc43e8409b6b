//! Core error types.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while decoding tasks, envelopes, or configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("label {0} not found in task labels")]
    MissingLabel(&'static str),

    #[error("label {key} is empty")]
    EmptyLabel { key: &'static str },

    #[error("invalid container name {0:?}")]
    InvalidContainerName(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("envelope encoding error: {0}")]
    Envelope(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}
