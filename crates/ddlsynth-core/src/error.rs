use thiserror::Error;

/// Core error type shared across ddlsynth crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Convenience alias for results returned by ddlsynth crates.
pub type Result<T> = std::result::Result<T, Error>;
