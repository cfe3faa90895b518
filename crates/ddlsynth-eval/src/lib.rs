//! Integrity validation for synthetic datasets.

pub mod engine;
pub mod errors;
pub mod model;
pub mod report;

pub use engine::Validator;
pub use errors::EvalError;
pub use model::{
    FkCoverage, TableReport, ValidateOptions, ValidationReport, ValidationSummary, Violation,
    WarningItem,
};
pub use report::render_report;
