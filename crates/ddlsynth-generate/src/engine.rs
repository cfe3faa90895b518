use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use chrono::{Duration, NaiveDate, NaiveTime};
use ddlsynth_core::{
    ColumnDef, Dataset, Row, Schema, TableDef, TypeFamily, Value, dependency_order,
};
use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, info};

use crate::checks::{ColumnConstraints, NumericBounds};
use crate::errors::GenerationError;
use crate::foreign::{pick_parent, reconcile_foreign_keys};
use crate::model::{ColumnProfile, GenerationConfig, GenerationMeta, TableMeta};
use crate::pk::{effective_primary_key, infer_primary_key};
use crate::rng::Lcg;

/// Days covered by generated dates, counted back from the base date.
const DATE_WINDOW_DAYS: i64 = 5 * 365;
const SAMPLE_VALUES: usize = 3;

/// Result of a deterministic generation run.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub dataset: Dataset,
    pub meta: GenerationMeta,
}

/// Seeded, offline generator producing schema-shaped rows.
#[derive(Debug, Clone)]
pub struct DeterministicGenerator {
    config: GenerationConfig,
    base_date: NaiveDate,
}

impl DeterministicGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        let base_date = config.resolved_base_date();
        Self { config, base_date }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Seeded stream for this configuration plus the effective seed.
    pub fn rng(&self) -> (Lcg, u64) {
        match self.config.seed {
            Some(seed) => (Lcg::new(seed), seed),
            None => Lcg::from_entropy(),
        }
    }

    /// Generate every table of `schema` in dependency order.
    pub fn generate(&self, schema: &Schema) -> Result<GenerationResult, GenerationError> {
        self.config.validate()?;
        let start = Instant::now();
        let (mut rng, seed) = self.rng();
        let order = dependency_order(schema);

        info!(tables = order.len(), seed, "deterministic generation started");

        let mut dataset = Dataset::new();
        for table_name in &order {
            let rows = self.generate_table(schema, table_name, &dataset, &mut rng)?;
            dataset.insert(table_name.clone(), rows);
        }

        let reassigned = reconcile_foreign_keys(schema, &mut dataset, &order, &mut rng);
        let meta = self.describe(schema, &dataset, &order, seed, &reassigned);

        info!(
            tables = order.len(),
            rows = dataset.values().map(Vec::len).sum::<usize>(),
            duration_ms = start.elapsed().as_millis() as u64,
            "deterministic generation completed"
        );

        Ok(GenerationResult { dataset, meta })
    }

    /// Generate rows for a single table.
    ///
    /// FK columns sample from parents already present in `existing`; values
    /// whose parent is missing stay null for [`reconcile_foreign_keys`].
    pub fn generate_table(
        &self,
        schema: &Schema,
        table_name: &str,
        existing: &Dataset,
        rng: &mut Lcg,
    ) -> Result<Vec<Row>, GenerationError> {
        let rows = self.config.rows_for(table_name);
        self.generate_rows(schema, table_name, rows, existing, rng)
    }

    /// Generate exactly `rows` rows for a table.
    pub fn generate_rows(
        &self,
        schema: &Schema,
        table_name: &str,
        rows: u64,
        existing: &Dataset,
        rng: &mut Lcg,
    ) -> Result<Vec<Row>, GenerationError> {
        let table = schema
            .table(table_name)
            .ok_or_else(|| GenerationError::UnknownTable(table_name.to_string()))?;
        let ctx = TableContext::new(schema, table, rows);

        debug!(table = %table_name, rows, "generating table");

        let mut out = Vec::with_capacity(rows as usize);
        for row_index in 0..rows {
            let parents = pick_parents(table, existing, rng);
            let mut row = Row::with_capacity(table.columns.len());
            for (name, column) in &table.columns {
                let value = self.column_value(&ctx, name, column, row_index, &parents, rng);
                row.insert(name.clone(), value);
            }
            out.push(row);
        }

        Ok(out)
    }

    fn column_value(
        &self,
        ctx: &TableContext<'_>,
        name: &str,
        column: &ColumnDef,
        row_index: u64,
        parents: &HashMap<String, Value>,
        rng: &mut Lcg,
    ) -> Value {
        let in_pk = ctx.primary_key.contains(name);

        if column.nullable && !in_pk {
            let probability = self
                .config
                .null_probability
                .for_column(&ctx.table.name, name);
            if probability > 0.0 && rng.random_bool(probability.min(1.0)) {
                return Value::Null;
            }
        }

        if in_pk && column.is_numeric() {
            return Value::Int(row_index as i64 + 1);
        }

        if ctx.table.foreign_key_for(name).is_some() {
            return parents.get(name).cloned().unwrap_or(Value::Null);
        }

        if let Some(values) = column
            .enumeration()
            .or_else(|| ctx.constraints.allowed(name))
        {
            let idx = rng.random_range(0..values.len());
            return Value::Text(values[idx].clone());
        }

        let bounds = ctx.constraints.bounds(name);
        match column.family() {
            TypeFamily::Integer | TypeFamily::Serial => match bounds {
                Some(bounds) => Value::Int(random_in_bounds(bounds, rng).round() as i64),
                None => Value::Int(row_index as i64 + 1),
            },
            TypeFamily::Boolean => Value::Bool(row_index % 2 == 0),
            TypeFamily::Date => Value::Text(
                random_date(self.base_date, rng)
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
            TypeFamily::Time => Value::Text(random_time(rng).format("%H:%M:%S").to_string()),
            TypeFamily::Timestamp => {
                let date = random_date(self.base_date, rng);
                let time = random_time(rng);
                Value::Text(format!(
                    "{} {}",
                    date.format("%Y-%m-%d"),
                    time.format("%H:%M:%S")
                ))
            }
            TypeFamily::Uuid => Value::Text(pattern_uuid(&ctx.table.name, name, row_index)),
            TypeFamily::Text => {
                if let Some(example) = ctx.example_for(name, rng) {
                    return example;
                }
                let value = format!("{}_{}_{}", ctx.table.name, name, row_index + 1);
                match type_length(&column.data_type) {
                    Some(max_len) if value.chars().count() > max_len => Value::Text(capped_text(
                        &ctx.table.name,
                        name,
                        row_index,
                        ctx.rows,
                        max_len,
                    )),
                    _ => Value::Text(value),
                }
            }
            TypeFamily::Decimal | TypeFamily::Float => {
                let raw = match bounds {
                    Some(bounds) => random_in_bounds(bounds, rng),
                    None => rng.random_range(0.0..1000.0),
                };
                Value::Float((raw * 100.0).round() / 100.0)
            }
            TypeFamily::Unknown => Value::Text(format!("{}_value_{}", name, row_index + 1)),
        }
    }

    /// Summarize a dataset produced for `schema` in `order`.
    ///
    /// Column profiles are attached only when `withMeta` is set.
    pub fn describe(
        &self,
        schema: &Schema,
        dataset: &Dataset,
        order: &[String],
        seed: u64,
        reassigned: &BTreeMap<String, u64>,
    ) -> GenerationMeta {
        let mut meta = GenerationMeta {
            seed,
            table_order: order.to_vec(),
            ..GenerationMeta::default()
        };

        for table_name in order {
            let Some(table) = schema.table(table_name) else {
                continue;
            };
            if table.primary_key.is_empty() {
                if let Some(column) = infer_primary_key(table) {
                    meta.inferred_primary_keys
                        .insert(table_name.clone(), column);
                }
            }

            let rows = dataset.get(table_name).map(Vec::as_slice).unwrap_or(&[]);
            meta.tables.insert(
                table_name.clone(),
                TableMeta {
                    rows_requested: self.config.rows_for(table_name),
                    rows_generated: rows.len() as u64,
                    foreign_keys: table.foreign_keys.len(),
                    fk_reassigned: reassigned.get(table_name).copied().unwrap_or(0),
                    columns: if self.config.with_meta {
                        profile_columns(table, rows)
                    } else {
                        IndexMap::new()
                    },
                },
            );
        }

        meta
    }
}

struct TableContext<'a> {
    table: &'a TableDef,
    schema: &'a Schema,
    primary_key: HashSet<String>,
    constraints: ColumnConstraints,
    rows: u64,
}

impl<'a> TableContext<'a> {
    fn new(schema: &'a Schema, table: &'a TableDef, rows: u64) -> Self {
        Self {
            table,
            schema,
            rows,
            primary_key: effective_primary_key(table).into_iter().collect(),
            constraints: ColumnConstraints::for_table(schema, table),
        }
    }

    fn example_for(&self, column: &str, rng: &mut Lcg) -> Option<Value> {
        let hint = self.schema.meta.value_hint(&self.table.name, column)?;
        if hint.examples.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..hint.examples.len());
        Some(Value::from(hint.examples[idx].clone()))
    }
}

fn pick_parents(table: &TableDef, existing: &Dataset, rng: &mut Lcg) -> HashMap<String, Value> {
    let mut values = HashMap::new();
    for fk in &table.foreign_keys {
        if let Some(tuple) = pick_parent(existing, fk, rng) {
            for (column, value) in fk.columns.iter().zip(tuple) {
                values.insert(column.clone(), value);
            }
        }
    }
    values
}

fn random_in_bounds(bounds: &NumericBounds, rng: &mut Lcg) -> f64 {
    let min = bounds.min.unwrap_or(0.0);
    let max = bounds.max.unwrap_or(min + 1000.0);
    if max <= min {
        return bounds.clamp(min);
    }
    bounds.clamp(rng.random_range(min..=max))
}

fn random_date(base_date: NaiveDate, rng: &mut Lcg) -> NaiveDate {
    let offset = rng.random_range(0..=DATE_WINDOW_DAYS);
    base_date - Duration::days(offset)
}

fn random_time(rng: &mut Lcg) -> NaiveTime {
    let seconds = rng.random_range(0..86_400u32);
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default()
}

/// Deterministic UUID derived from table, column and row index.
fn pattern_uuid(table: &str, column: &str, row_index: u64) -> String {
    let high = hash_key(&format!("{table}.{column}"));
    let low = row_index + 1;
    uuid::Uuid::from_u128(((high as u128) << 64) | low as u128).to_string()
}

/// Text pattern cut to `max_len` characters that still encodes the row.
///
/// The row number is written in base 36, zero-padded to the width needed
/// for `rows`, after as much of `table_column` as fits. Values stay distinct
/// while `rows` fits in `max_len` base-36 digits.
fn capped_text(table: &str, column: &str, row_index: u64, rows: u64, max_len: usize) -> String {
    let width = base36(rows.max(1)).len().min(max_len);
    let digits = base36(row_index + 1);
    let suffix = if digits.len() >= width {
        digits[digits.len() - width..].to_string()
    } else {
        format!("{digits:0>width$}")
    };
    let prefix: String = format!("{table}_{column}")
        .chars()
        .take(max_len - width)
        .collect();
    format!("{prefix}{suffix}")
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn hash_key(key: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Declared length of a character type, e.g. `varchar(12)` -> 12.
fn type_length(data_type: &str) -> Option<usize> {
    let lowered = data_type.to_lowercase();
    if !(lowered.contains("char") || lowered.contains("string")) {
        return None;
    }
    let open = lowered.find('(')?;
    let close = lowered[open..].find(')')? + open;
    lowered[open + 1..close]
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|len| *len > 0)
}

fn profile_columns(table: &TableDef, rows: &[Row]) -> IndexMap<String, ColumnProfile> {
    let mut profiles = IndexMap::new();
    for name in table.columns.keys() {
        let mut nulls = 0u64;
        let mut distinct = HashSet::new();
        let mut samples = Vec::new();
        for row in rows {
            let value = row.get(name).unwrap_or(&Value::Null);
            if value.is_null() {
                nulls += 1;
                continue;
            }
            if distinct.insert(value.key()) && samples.len() < SAMPLE_VALUES {
                samples.push(value.clone());
            }
        }
        let null_pct = if rows.is_empty() {
            0.0
        } else {
            (nulls as f64 / rows.len() as f64 * 10_000.0).round() / 100.0
        };
        profiles.insert(
            name.clone(),
            ColumnProfile {
                null_pct,
                distinct_count: distinct.len() as u64,
                samples,
            },
        );
    }
    profiles
}
