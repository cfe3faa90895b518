//! Deterministic data generation and integrity repair for ddlsynth.
//!
//! The generator consumes a parsed [`ddlsynth_core::Schema`] and produces a
//! seeded, reproducible [`ddlsynth_core::Dataset`]. It is the offline default
//! and the per-table fallback for AI generation.

pub mod checks;
pub mod engine;
pub mod errors;
pub mod foreign;
pub mod model;
pub mod pk;
pub mod repair;
pub mod rng;

pub use engine::{DeterministicGenerator, GenerationResult};
pub use errors::GenerationError;
pub use model::{
    ColumnProfile, GenerationConfig, GenerationMeta, NullProbability, TableMeta,
};
pub use pk::{effective_primary_key, infer_primary_key};
pub use repair::{IntegrityRepairer, RepairAudit};
pub use rng::Lcg;
