use ddlsynth_core::TableDef;

/// Infer a single-column primary key for a table that declares none.
///
/// Precedence:
/// 1. a numeric column named `id`
/// 2. a numeric column named `<table>_id`
/// 3. the first numeric column ending in `_id` that is not a foreign key
///
/// Returns `None` when no candidate exists; the table is then keyless.
pub fn infer_primary_key(table: &TableDef) -> Option<String> {
    let numeric = |name: &str| {
        table
            .columns
            .get(name)
            .map(|column| column.is_numeric())
            .unwrap_or(false)
    };

    if numeric("id") {
        return Some("id".to_string());
    }

    let own = format!("{}_id", table.name);
    if numeric(&own) {
        return Some(own);
    }

    table
        .columns
        .iter()
        .find(|(name, column)| {
            name.ends_with("_id")
                && column.is_numeric()
                && table.foreign_key_for(name.as_str()).is_none()
        })
        .map(|(name, _)| name.clone())
}

/// Declared primary key, or the inferred single column when none is declared.
pub fn effective_primary_key(table: &TableDef) -> Vec<String> {
    if !table.primary_key.is_empty() {
        return table.primary_key.clone();
    }
    infer_primary_key(table).into_iter().collect()
}

/// Single-column key used by the repairer; composite keys yield `None`.
pub fn single_column_key(table: &TableDef) -> Option<String> {
    match table.primary_key.as_slice() {
        [] => infer_primary_key(table),
        [column] => Some(column.clone()),
        _ => None,
    }
}
