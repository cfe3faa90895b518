use std::collections::{BTreeMap, HashSet};

use ddlsynth_core::{Dataset, ForeignKey, Row, Schema, Value};
use rand::Rng;
use tracing::debug;

/// Distinct non-null tuples of `columns` across `rows`, in first-seen order.
pub fn parent_tuples(rows: &[Row], columns: &[String]) -> Vec<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut tuples = Vec::new();

    for row in rows {
        let tuple: Option<Vec<Value>> = columns
            .iter()
            .map(|column| row.get(column).filter(|value| !value.is_null()).cloned())
            .collect();
        let Some(tuple) = tuple else {
            continue;
        };
        if seen.insert(tuple_key(&tuple)) {
            tuples.push(tuple);
        }
    }

    tuples
}

/// Pick a parent tuple uniformly for a child row about to be generated.
pub fn pick_parent<R: Rng>(
    dataset: &Dataset,
    fk: &ForeignKey,
    rng: &mut R,
) -> Option<Vec<Value>> {
    let rows = dataset.get(&fk.reference_table)?;
    let tuples = parent_tuples(rows, &fk.reference_columns);
    if tuples.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..tuples.len());
    tuples.into_iter().nth(idx)
}

/// Reassign child FK values that are null or absent from the parent.
///
/// Runs over `order` so parents settle before their children. Replacement
/// tuples are drawn uniformly at random. Returns reassigned row counts per
/// table; parents without rows leave their children untouched.
pub fn reconcile_foreign_keys<R: Rng>(
    schema: &Schema,
    dataset: &mut Dataset,
    order: &[String],
    rng: &mut R,
) -> BTreeMap<String, u64> {
    let mut reassigned = BTreeMap::new();

    for table_name in order {
        let Some(table) = schema.table(table_name) else {
            continue;
        };

        for fk in &table.foreign_keys {
            if fk.columns.len() != fk.reference_columns.len() {
                continue;
            }
            let tuples = match dataset.get(&fk.reference_table) {
                Some(rows) => parent_tuples(rows, &fk.reference_columns),
                None => continue,
            };
            if tuples.is_empty() {
                continue;
            }
            let valid: HashSet<String> = tuples.iter().map(|tuple| tuple_key(tuple)).collect();

            let Some(rows) = dataset.get_mut(table_name) else {
                continue;
            };
            let mut count = 0u64;
            for row in rows.iter_mut() {
                if child_tuple_valid(row, &fk.columns, &valid) {
                    continue;
                }
                let tuple = &tuples[rng.random_range(0..tuples.len())];
                for (column, value) in fk.columns.iter().zip(tuple) {
                    row.insert(column.clone(), value.clone());
                }
                count += 1;
            }

            if count > 0 {
                debug!(
                    table = %table_name,
                    fk = %fk.label(),
                    reassigned = count,
                    "reconciled foreign key values"
                );
                *reassigned.entry(table_name.clone()).or_insert(0) += count;
            }
        }
    }

    reassigned
}

fn child_tuple_valid(row: &Row, columns: &[String], valid: &HashSet<String>) -> bool {
    let tuple: Option<Vec<Value>> = columns
        .iter()
        .map(|column| row.get(column).filter(|value| !value.is_null()).cloned())
        .collect();
    match tuple {
        Some(tuple) => valid.contains(&tuple_key(&tuple)),
        None => false,
    }
}

/// Canonical key for a value tuple.
pub fn tuple_key(tuple: &[Value]) -> String {
    tuple
        .iter()
        .map(Value::key)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}
