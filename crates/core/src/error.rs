use crate::job::JobStatus;
use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}
