use ddlsynth_ai::CompletionError;
use thiserror::Error;

/// Errors emitted while recovering a schema from DDL.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no tables could be recovered from the DDL")]
    NoTables,
    #[error("schema fallback failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("invalid schema json: {0}")]
    Json(#[from] serde_json::Error),
}
