use thiserror::Error;

/// Failure taxonomy for the security core.
///
/// Denials (`AuthorizationDenied`, `CommandNotWhitelisted`) are terminal for
/// the request but are always recorded in the event log before being
/// reported. `StoreUnavailable` fails the affected operation only; it must
/// never take down the tick loop or other in-flight requests.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("operator {0} is not authorized")]
    AuthorizationDenied(i64),

    #[error("command is not whitelisted: {0}")]
    CommandNotWhitelisted(String),

    #[error("command timed out after {0} seconds")]
    CommandTimedOut(u64),

    #[error("failed to spawn command: {0}")]
    CommandSpawnFailed(String),

    #[error("scheduled task {0} not found")]
    TaskNotFound(i64),

    #[error("scheduled task {0} belongs to another operator")]
    TaskOwnershipMismatch(i64),

    #[error("invalid schedule time '{0}', expected HH:MM")]
    InvalidSchedule(String),

    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<rusqlite::Error> for SecurityError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
