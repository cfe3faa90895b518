use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("table '{0}' not found in schema")]
    UnknownTable(String),
    #[error("repair failed: {0}")]
    Repair(String),
}
