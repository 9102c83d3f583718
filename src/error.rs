use thiserror::Error;

use crate::{
    dao::storage::StorageError,
    gateway::{HistoryError, RosterError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Engine is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The history source failed while backfilling.
    #[error("history source failed")]
    History(#[source] HistoryError),
    /// The voice roster failed while re-deriving live sessions.
    #[error("voice roster failed")]
    Roster(#[source] RosterError),
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<HistoryError> for ServiceError {
    fn from(err: HistoryError) -> Self {
        ServiceError::History(err)
    }
}

impl From<RosterError> for ServiceError {
    fn from(err: RosterError) -> Self {
        ServiceError::Roster(err)
    }
}
