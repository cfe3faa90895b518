use std::collections::{BTreeMap, HashSet};

use ddlsynth_core::{Dataset, Row, Schema, Value, dependency_order};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::GenerationError;
use crate::foreign::parent_tuples;
use crate::pk::single_column_key;

/// Key values longer than this are treated as implausible.
pub const MAX_PLAUSIBLE_KEY_LEN: usize = 64;

/// Audit trail of repair rewrites, keyed by `table.column` or table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAudit {
    /// Rows whose primary key was rewritten, per `table.column`.
    pub pk_rewrites: BTreeMap<String, u64>,
    /// Child values reassigned to an existing parent key, per `table.column`.
    pub fk_reassignments: BTreeMap<String, u64>,
    /// Rows synthesized for empty keyed tables, per table.
    pub synthetic_rows: BTreeMap<String, u64>,
}

impl RepairAudit {
    pub fn is_empty(&self) -> bool {
        self.pk_rewrites.is_empty()
            && self.fk_reassignments.is_empty()
            && self.synthetic_rows.is_empty()
    }

    pub fn total_changes(&self) -> u64 {
        self.pk_rewrites.values().sum::<u64>()
            + self.fk_reassignments.values().sum::<u64>()
            + self.synthetic_rows.values().sum::<u64>()
    }
}

/// Heuristic corrector for primary and foreign key defects.
///
/// Primary keys are fixed by rewriting the whole column to `1..=n`; simple
/// foreign keys are pointed round-robin at the parent's existing keys.
#[derive(Debug, Clone, Default)]
pub struct IntegrityRepairer;

impl IntegrityRepairer {
    pub fn new() -> Self {
        Self
    }

    pub fn repair(
        &self,
        schema: &Schema,
        dataset: &mut Dataset,
    ) -> Result<RepairAudit, GenerationError> {
        let mut audit = RepairAudit::default();
        let order = dependency_order(schema);

        for table_name in &order {
            self.repair_primary_key(schema, dataset, table_name, &mut audit)?;
        }
        for table_name in &order {
            self.repair_foreign_keys(schema, dataset, table_name, &mut audit)?;
        }

        info!(
            pk_rewrites = audit.pk_rewrites.values().sum::<u64>(),
            fk_reassignments = audit.fk_reassignments.values().sum::<u64>(),
            synthetic_rows = audit.synthetic_rows.values().sum::<u64>(),
            "integrity repair finished"
        );

        Ok(audit)
    }

    fn repair_primary_key(
        &self,
        schema: &Schema,
        dataset: &mut Dataset,
        table_name: &str,
        audit: &mut RepairAudit,
    ) -> Result<(), GenerationError> {
        let table = schema
            .table(table_name)
            .ok_or_else(|| GenerationError::UnknownTable(table_name.to_string()))?;
        let Some(pk) = single_column_key(table) else {
            return Ok(());
        };

        let rows = dataset.entry(table_name.to_string()).or_default();
        if rows.is_empty() {
            let mut row: Row = table
                .columns
                .keys()
                .map(|name| (name.clone(), Value::Null))
                .collect();
            row.insert(pk.clone(), Value::Int(1));
            rows.push(row);
            audit.synthetic_rows.insert(table_name.to_string(), 1);
            return Ok(());
        }

        if !needs_key_rewrite(rows, &pk) {
            return Ok(());
        }

        for (idx, row) in rows.iter_mut().enumerate() {
            row.insert(pk.clone(), Value::Int(idx as i64 + 1));
        }
        audit
            .pk_rewrites
            .insert(format!("{table_name}.{pk}"), rows.len() as u64);
        Ok(())
    }

    fn repair_foreign_keys(
        &self,
        schema: &Schema,
        dataset: &mut Dataset,
        table_name: &str,
        audit: &mut RepairAudit,
    ) -> Result<(), GenerationError> {
        let table = schema
            .table(table_name)
            .ok_or_else(|| GenerationError::UnknownTable(table_name.to_string()))?;

        for fk in table.foreign_keys.iter().filter(|fk| fk.is_simple()) {
            let parent_rows = dataset.get(&fk.reference_table).ok_or_else(|| {
                GenerationError::Repair(format!(
                    "parent table '{}' missing for {table_name}",
                    fk.reference_table
                ))
            })?;
            let parents: Vec<Value> = parent_tuples(parent_rows, &fk.reference_columns)
                .into_iter()
                .filter_map(|tuple| tuple.into_iter().next())
                .collect();
            if parents.is_empty() {
                continue;
            }
            let valid: HashSet<String> = parents.iter().map(Value::key).collect();

            let column = &fk.columns[0];
            let Some(rows) = dataset.get_mut(table_name) else {
                continue;
            };
            let mut cursor = 0usize;
            let mut count = 0u64;
            for row in rows.iter_mut() {
                let current = row.get(column).unwrap_or(&Value::Null);
                if !current.is_null() && valid.contains(&current.key()) {
                    continue;
                }
                row.insert(column.clone(), parents[cursor % parents.len()].clone());
                cursor += 1;
                count += 1;
            }

            if count > 0 {
                *audit
                    .fk_reassignments
                    .entry(format!("{table_name}.{column}"))
                    .or_insert(0) += count;
            }
        }

        Ok(())
    }
}

fn needs_key_rewrite(rows: &[Row], pk: &str) -> bool {
    let mut seen = HashSet::new();
    let mut any_numeric = false;

    for row in rows {
        let value = row.get(pk).unwrap_or(&Value::Null);
        if value.is_null() || value.display_len() > MAX_PLAUSIBLE_KEY_LEN {
            return true;
        }
        if !seen.insert(value.key()) {
            return true;
        }
        any_numeric |= value.is_numeric();
    }

    !any_numeric
}
