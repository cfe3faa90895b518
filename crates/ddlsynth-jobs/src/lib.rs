//! Asynchronous generation jobs.
//!
//! A [`JobManager`] runs the parse, generate and validate pipeline on the
//! tokio runtime, one task per job, under a concurrency cap. Callers poll
//! [`JobManager::status`] or follow [`JobManager::subscribe`].

pub mod errors;
pub mod manager;
pub mod model;
mod progress;

pub use errors::JobError;
pub use manager::{JobManager, JobSettings};
pub use model::{Job, JobEvent, JobId, JobRequest, JobResult, JobStatus};
