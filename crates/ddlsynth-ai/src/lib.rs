//! AI-assisted dataset generation.
//!
//! [`AiOrchestrator`] walks the schema in dependency order, asks a
//! [`CompletionClient`] for rows per table and falls back to the
//! deterministic generator whenever the service fails or answers with
//! nothing usable.

pub mod cancel;
pub mod client;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod prompt;
pub mod response;

pub use cancel::CancellationToken;
pub use client::{CompletionClient, CompletionRequest, HttpClientConfig, HttpCompletionClient};
pub use errors::{CompletionError, OrchestratorError, ResponseError};
pub use events::{NoopSink, ProgressEvent, ProgressSink, RowSource};
pub use orchestrator::{AiError, AiOrchestrator, GenerationOutcome, OutcomeMeta};
pub use response::{ResponseShape, extract_json, parse_response, records_for_table};
