use thiserror::Error;

/// Errors emitted by the validator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
    #[error("validation failed with {0} violation(s)")]
    Violations(u64),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
