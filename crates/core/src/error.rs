use thiserror::Error;

use crate::model::{AttemptSummaryError, SessionStateError, SettingsError, ValidationError};

/// Umbrella error for callers that do not need to distinguish domain failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    AttemptSummary(#[from] AttemptSummaryError),
}
