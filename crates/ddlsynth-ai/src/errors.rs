use ddlsynth_generate::GenerationError;
use thiserror::Error;

/// Failures talking to the completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("completion timed out after {0} ms")]
    Timeout(u64),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
    #[error("completion service is disabled")]
    Disabled,
}

/// Why a completion text yielded no records.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    #[error("no JSON value found in response")]
    NoJson,
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("unrecognized response shape: {0}")]
    Unrecognized(String),
}

/// Errors that abort an orchestrated generation run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
