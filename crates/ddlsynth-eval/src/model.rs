use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::EvalError;

/// Options for dataset validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateOptions {
    /// Limit the number of example violations kept in the report.
    pub max_examples: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self { max_examples: 20 }
    }
}

/// Structured violation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub code: String,
    pub path: String,
    pub message: String,
    /// 1-based row position within the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Structured warning entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningItem {
    pub code: String,
    pub path: String,
    pub message: String,
}

/// Share of non-null child tuples that resolve into the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FkCoverage {
    pub fk: String,
    pub covered_pct: f64,
}

/// Per-table integrity counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub row_count: u64,
    pub pk_duplicates: u64,
    pub fk_violations: u64,
    pub not_null_violations: u64,
    pub fk_coverage: Vec<FkCoverage>,
}

impl TableReport {
    pub fn violation_count(&self) -> u64 {
        self.pk_duplicates + self.fk_violations + self.not_null_violations
    }
}

/// Aggregate counters across all tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub tables: u64,
    pub rows: u64,
    pub pk_duplicates: u64,
    pub fk_violations: u64,
    pub not_null_violations: u64,
    pub passed: bool,
}

impl ValidationSummary {
    pub fn total_violations(&self) -> u64 {
        self.pk_duplicates + self.fk_violations + self.not_null_violations
    }
}

/// Result of validating a dataset against its schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Table reports in schema declaration order.
    pub tables: IndexMap<String, TableReport>,
    pub summary: ValidationSummary,
    /// Example violations, capped by [`ValidateOptions::max_examples`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningItem>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.summary.passed
    }

    /// Turn a failing report into an error.
    pub fn ensure_passed(&self) -> Result<(), EvalError> {
        if self.summary.passed {
            Ok(())
        } else {
            Err(EvalError::Violations(self.summary.total_violations()))
        }
    }
}
