use thiserror::Error;

use crate::model::JobId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job capacity exceeded ({limit} jobs in flight)")]
    CapacityExceeded { limit: usize },
    #[error("job not found: {0}")]
    NotFound(JobId),
}

pub type Result<T> = std::result::Result<T, JobError>;
