//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{AttemptSummaryError, SessionStateError, ValidationError};
use storage::repository::StorageError;

/// Errors emitted when background work cannot be scheduled.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error("no tokio runtime is running")]
    NoRuntime,
    #[error("duration must be > 0")]
    ZeroDuration,
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Summary(#[from] AttemptSummaryError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
