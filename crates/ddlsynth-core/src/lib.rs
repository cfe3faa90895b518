//! Core contracts and helpers for ddlsynth.
//!
//! This crate defines the canonical schema and dataset types, the FK
//! dependency ordering, and the schema consistency helpers shared by the
//! parser, the generators and the validator.

pub mod constraints;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod schema;
pub mod types;
pub mod validation;

pub use constraints::{CheckConstraint, ForeignKey};
pub use contract::schema_json_schema;
pub use dataset::{Dataset, Row, Value};
pub use error::{Error, Result};
pub use graph::{FkGraphReport, FkGraphSummary, build_fk_graph_report, dependency_order};
pub use schema::{ColumnDef, Schema, SchemaMeta, TableDef, ValueHint};
pub use types::{TypeFamily, type_family};
pub use validation::{reconcile_references, validate_schema};

/// Current contract version for serialized schema artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
