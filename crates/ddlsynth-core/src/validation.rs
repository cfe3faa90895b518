use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Validate internal consistency of a schema.
///
/// This checks:
/// - every table has at least one column
/// - primary key columns exist
/// - foreign key columns and referenced targets exist
pub fn validate_schema(schema: &Schema) -> Result<()> {
    for (name, table) in &schema.tables {
        if table.columns.is_empty() {
            return Err(Error::InvalidSchema(format!("table has no columns: {name}")));
        }

        for column in &table.primary_key {
            if !table.columns.contains_key(column) {
                return Err(Error::InvalidSchema(format!(
                    "primary key column not found: {name}.{column}"
                )));
            }
        }

        for fk in &table.foreign_keys {
            for column in &fk.columns {
                if !table.columns.contains_key(column) {
                    return Err(Error::InvalidSchema(format!(
                        "foreign key column not found: {name}.{column}"
                    )));
                }
            }

            let parent = schema.tables.get(&fk.reference_table).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "referenced table not found: {}",
                    fk.reference_table
                ))
            })?;

            if fk.columns.len() != fk.reference_columns.len() {
                return Err(Error::InvalidSchema(format!(
                    "foreign key arity mismatch: {name} {}",
                    fk.label()
                )));
            }

            for column in &fk.reference_columns {
                if !parent.columns.contains_key(column) {
                    return Err(Error::InvalidSchema(format!(
                        "referenced column not found: {}.{column}",
                        fk.reference_table
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Lenient counterpart of [`validate_schema`] used after best-effort recovery.
///
/// Drops dangling primary-key columns and foreign keys, fills omitted
/// referenced columns from the parent's primary key, and returns one warning
/// per adjustment.
pub fn reconcile_references(schema: &mut Schema) -> Vec<String> {
    let mut warnings = Vec::new();
    let primary_keys: Vec<(String, Vec<String>, BTreeSet<String>)> = schema
        .tables
        .iter()
        .map(|(name, table)| {
            (
                name.clone(),
                table.primary_key.clone(),
                table.columns.keys().cloned().collect(),
            )
        })
        .collect();
    let lookup = |table: &str| primary_keys.iter().find(|(name, _, _)| name == table);

    for (name, table) in schema.tables.iter_mut() {
        let before = table.primary_key.len();
        table
            .primary_key
            .retain(|column| table.columns.contains_key(column));
        if table.primary_key.len() != before {
            warnings.push(format!("{name}: dropped primary key columns missing from table"));
        }

        let mut kept = Vec::with_capacity(table.foreign_keys.len());
        for mut fk in std::mem::take(&mut table.foreign_keys) {
            let Some((_, parent_pk, parent_columns)) = lookup(&fk.reference_table) else {
                warnings.push(format!(
                    "{name}: dropped foreign key to unknown table '{}'",
                    fk.reference_table
                ));
                continue;
            };

            if fk.columns.iter().any(|col| !table.columns.contains_key(col)) {
                warnings.push(format!(
                    "{name}: dropped foreign key with unknown columns ({})",
                    fk.label()
                ));
                continue;
            }

            if fk.reference_columns.is_empty() {
                if parent_pk.len() == fk.columns.len() {
                    fk.reference_columns = parent_pk.clone();
                } else if fk.columns.len() == 1 && parent_columns.contains("id") {
                    fk.reference_columns = vec!["id".to_string()];
                } else {
                    warnings.push(format!(
                        "{name}: dropped foreign key without resolvable referenced columns ({})",
                        fk.label()
                    ));
                    continue;
                }
                warnings.push(format!(
                    "{name}: defaulted referenced columns for {}",
                    fk.label()
                ));
            }

            if fk.columns.len() != fk.reference_columns.len()
                || fk
                    .reference_columns
                    .iter()
                    .any(|col| !parent_columns.contains(col))
            {
                warnings.push(format!(
                    "{name}: dropped foreign key with unknown referenced columns ({})",
                    fk.label()
                ));
                continue;
            }

            kept.push(fk);
        }
        table.foreign_keys = kept;
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ForeignKey;
    use crate::schema::{ColumnDef, TableDef};

    fn users_and_orders(reference_columns: Vec<String>) -> Schema {
        let mut users = TableDef::new("users");
        users
            .columns
            .insert("id".to_string(), ColumnDef::new("int", false));
        users.primary_key = vec!["id".to_string()];

        let mut orders = TableDef::new("orders");
        orders
            .columns
            .insert("id".to_string(), ColumnDef::new("int", false));
        orders
            .columns
            .insert("user_id".to_string(), ColumnDef::new("int", true));
        orders.foreign_keys.push(ForeignKey {
            columns: vec!["user_id".to_string()],
            reference_table: "users".to_string(),
            reference_columns,
        });

        let mut schema = Schema::default();
        schema.tables.insert("users".to_string(), users);
        schema.tables.insert("orders".to_string(), orders);
        schema
    }

    #[test]
    fn valid_schema_passes() {
        let schema = users_and_orders(vec!["id".to_string()]);
        assert!(validate_schema(&schema).is_ok());
    }

    #[test]
    fn rejects_unknown_referenced_column() {
        let schema = users_and_orders(vec!["uuid".to_string()]);
        let err = validate_schema(&schema).unwrap_err();
        assert!(err.to_string().contains("referenced column not found"));
    }

    #[test]
    fn reconcile_defaults_reference_to_parent_pk() {
        let mut schema = users_and_orders(Vec::new());
        let warnings = reconcile_references(&mut schema);

        assert_eq!(warnings.len(), 1);
        let fk = &schema.tables["orders"].foreign_keys[0];
        assert_eq!(fk.reference_columns, vec!["id".to_string()]);
        assert!(validate_schema(&schema).is_ok());
    }

    #[test]
    fn reconcile_drops_dangling_foreign_keys() {
        let mut schema = users_and_orders(vec!["id".to_string()]);
        schema.tables.shift_remove("users");

        let warnings = reconcile_references(&mut schema);
        assert!(warnings[0].contains("unknown table 'users'"));
        assert!(schema.tables["orders"].foreign_keys.is_empty());
    }
}
