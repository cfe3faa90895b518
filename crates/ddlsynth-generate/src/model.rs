use std::collections::BTreeMap;

use chrono::NaiveDate;
use ddlsynth_core::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Rows generated per table when neither a per-table nor a global count is set.
pub const DEFAULT_ROWS_PER_TABLE: u64 = 10;

/// Per-request generation options.
///
/// Field names follow the camelCase request contract (`numRecords`,
/// `perTableRowCounts`, ...). Row counts are advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Advisory global row count.
    pub num_records: Option<u64>,
    /// Per-table row count overrides.
    pub per_table_row_counts: BTreeMap<String, u64>,
    pub null_probability: NullProbability,
    /// Seed for reproducible output; ambient entropy when absent.
    pub seed: Option<u64>,
    /// Sampling temperature passed to the completion service.
    pub temperature: Option<f32>,
    /// Token cap passed to the completion service.
    pub max_tokens: Option<u32>,
    /// Attach generation metadata to the result.
    pub with_meta: bool,
    /// Run the integrity repairer after generation.
    pub integrity_repair: bool,
    /// Verbose diagnostics (prompts and raw responses are logged).
    pub debug: bool,
    /// Free-text instructions forwarded to the completion service.
    pub instructions: Option<String>,
    /// Anchor for generated dates.
    pub base_date: Option<NaiveDate>,
    /// Rows per progress chunk when delivering a table.
    pub chunk_size: usize,
    /// Pause between chunks, in milliseconds.
    pub chunk_delay_ms: u64,
    /// Extra completion attempts per table after the first one.
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_records: None,
            per_table_row_counts: BTreeMap::new(),
            null_probability: NullProbability::default(),
            seed: None,
            temperature: None,
            max_tokens: None,
            with_meta: false,
            integrity_repair: false,
            debug: false,
            instructions: None,
            base_date: None,
            chunk_size: 50,
            chunk_delay_ms: 0,
            max_retries: 1,
        }
    }
}

impl GenerationConfig {
    /// Advisory row count for a table.
    pub fn rows_for(&self, table: &str) -> u64 {
        self.per_table_row_counts
            .get(table)
            .copied()
            .or(self.num_records)
            .unwrap_or(DEFAULT_ROWS_PER_TABLE)
    }

    /// Anchor date for date/time synthesis.
    ///
    /// Seeded runs use a fixed anchor so output does not drift with the clock.
    pub fn resolved_base_date(&self) -> NaiveDate {
        if let Some(date) = self.base_date {
            return date;
        }
        if self.seed.is_some() {
            return NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        }
        chrono::Utc::now().date_naive()
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        self.null_probability.validate()?;
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(GenerationError::InvalidConfig(format!(
                    "temperature must be within [0, 2], got {temperature}"
                )));
            }
        }
        if self.chunk_size == 0 {
            return Err(GenerationError::InvalidConfig(
                "chunkSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Null probability, either a single global value or scoped overrides.
///
/// Scoped column keys use `table.column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NullProbability {
    Global(f64),
    Scoped {
        #[serde(default)]
        global: f64,
        #[serde(default)]
        tables: BTreeMap<String, f64>,
        #[serde(default)]
        columns: BTreeMap<String, f64>,
    },
}

impl Default for NullProbability {
    fn default() -> Self {
        NullProbability::Global(0.0)
    }
}

impl NullProbability {
    /// Column-specific > table-specific > global.
    pub fn for_column(&self, table: &str, column: &str) -> f64 {
        match self {
            NullProbability::Global(value) => *value,
            NullProbability::Scoped {
                global,
                tables,
                columns,
            } => columns
                .get(&format!("{table}.{column}"))
                .or_else(|| tables.get(table))
                .copied()
                .unwrap_or(*global),
        }
    }

    fn validate(&self) -> Result<(), GenerationError> {
        let values: Vec<f64> = match self {
            NullProbability::Global(value) => vec![*value],
            NullProbability::Scoped {
                global,
                tables,
                columns,
            } => std::iter::once(*global)
                .chain(tables.values().copied())
                .chain(columns.values().copied())
                .collect(),
        };

        match values.into_iter().find(|value| !(0.0..=1.0).contains(value)) {
            Some(value) => Err(GenerationError::InvalidConfig(format!(
                "nullProbability must be within [0, 1], got {value}"
            ))),
            None => Ok(()),
        }
    }
}

/// Metadata describing a generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMeta {
    /// Effective seed; drawn from entropy when the request had none.
    pub seed: u64,
    pub table_order: Vec<String>,
    /// Primary keys inferred for tables without a declared key.
    pub inferred_primary_keys: BTreeMap<String, String>,
    pub tables: IndexMap<String, TableMeta>,
}

/// Per-table generation summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub foreign_keys: usize,
    /// FK values rewritten by the reconciliation post-pass.
    pub fk_reassigned: u64,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub columns: IndexMap<String, ColumnProfile>,
}

/// Column statistics emitted when `withMeta` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub null_pct: f64,
    pub distinct_count: u64,
    pub samples: Vec<Value>,
}
