use std::collections::HashSet;

use ddlsynth_core::{Dataset, ForeignKey, Row, Schema, TableDef, Value};
use ddlsynth_generate::effective_primary_key;
use ddlsynth_generate::foreign::tuple_key;
use tracing::debug;

use crate::model::{
    FkCoverage, TableReport, ValidateOptions, ValidationReport, ValidationSummary, Violation,
    WarningItem,
};

/// Check datasets against the schema's PK, FK and NOT NULL constraints.
///
/// Validation never mutates its inputs and always produces a report;
/// defects are counted, not raised.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidateOptions,
}

impl Validator {
    pub fn new(options: ValidateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidateOptions {
        &self.options
    }

    pub fn validate(&self, schema: &Schema, dataset: &Dataset) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let empty: Vec<Row> = Vec::new();

        for (name, table) in &schema.tables {
            let rows = dataset.get(name).unwrap_or(&empty);
            let mut table_report = TableReport {
                row_count: rows.len() as u64,
                ..TableReport::default()
            };

            table_report.not_null_violations = evaluate_not_null(table, rows, &mut violations);
            table_report.pk_duplicates = evaluate_primary_key(table, rows, &mut violations);
            for fk in &table.foreign_keys {
                if let Some(coverage) =
                    evaluate_foreign_key(table, fk, rows, dataset, &mut warnings, &mut violations)
                {
                    table_report.fk_violations += coverage.violations;
                    table_report.fk_coverage.push(FkCoverage {
                        fk: fk.label(),
                        covered_pct: coverage.covered_pct(),
                    });
                }
            }

            debug!(
                table = %name,
                rows = table_report.row_count,
                violations = table_report.violation_count(),
                "table validated"
            );
            report.tables.insert(name.clone(), table_report);
        }

        for name in dataset.keys() {
            if schema.table(name).is_none() {
                warnings.push(WarningItem {
                    code: "unknown_table".to_string(),
                    path: name.clone(),
                    message: "table not declared in schema".to_string(),
                });
            }
        }

        sort_violations(&mut violations);
        sort_warnings(&mut warnings);
        violations.truncate(self.options.max_examples);

        report.summary = summarize(&report);
        report.violations = violations;
        report.warnings = warnings;
        report
    }
}

struct FkCounts {
    checked: u64,
    violations: u64,
}

impl FkCounts {
    fn covered_pct(&self) -> f64 {
        if self.checked == 0 {
            return 100.0;
        }
        let covered = (self.checked - self.violations) as f64;
        (covered / self.checked as f64 * 10_000.0).round() / 100.0
    }
}

fn evaluate_not_null(table: &TableDef, rows: &[Row], violations: &mut Vec<Violation>) -> u64 {
    let mut total = 0u64;
    for (column, def) in &table.columns {
        if def.nullable {
            continue;
        }
        for (idx, row) in rows.iter().enumerate() {
            if cell(row, column).is_null() {
                total += 1;
                violations.push(Violation {
                    code: "not_null".to_string(),
                    path: format!("{}.{}", table.name, column),
                    message: "null value in NOT NULL column".to_string(),
                    row_index: Some(idx as u64 + 1),
                    example: None,
                });
            }
        }
    }
    total
}

fn evaluate_primary_key(table: &TableDef, rows: &[Row], violations: &mut Vec<Violation>) -> u64 {
    let columns = effective_primary_key(table);
    if columns.is_empty() {
        return 0;
    }

    let mut seen = HashSet::new();
    let mut duplicates = 0u64;
    for (idx, row) in rows.iter().enumerate() {
        let Some(tuple) = complete_tuple(row, &columns) else {
            continue;
        };
        let key = tuple_key(&tuple);
        if !seen.insert(key) {
            duplicates += 1;
            violations.push(Violation {
                code: "primary_key".to_string(),
                path: format!("{}.{}", table.name, columns.join(",")),
                message: "duplicate key detected".to_string(),
                row_index: Some(idx as u64 + 1),
                example: Some(display_tuple(&tuple)),
            });
        }
    }
    duplicates
}

fn evaluate_foreign_key(
    table: &TableDef,
    fk: &ForeignKey,
    rows: &[Row],
    dataset: &Dataset,
    warnings: &mut Vec<WarningItem>,
    violations: &mut Vec<Violation>,
) -> Option<FkCounts> {
    if fk.columns.len() != fk.reference_columns.len() {
        warnings.push(WarningItem {
            code: "fk_mismatch".to_string(),
            path: format!("{}.{}", table.name, fk.columns.join(",")),
            message: "foreign key column count mismatch".to_string(),
        });
        return None;
    }

    let parent_keys: HashSet<String> = match dataset.get(&fk.reference_table) {
        Some(parent_rows) => parent_rows
            .iter()
            .filter_map(|row| complete_tuple(row, &fk.reference_columns))
            .map(|tuple| tuple_key(&tuple))
            .collect(),
        None => {
            warnings.push(WarningItem {
                code: "missing_parent_table".to_string(),
                path: table.name.clone(),
                message: format!(
                    "parent table '{}' not found in dataset",
                    fk.reference_table
                ),
            });
            HashSet::new()
        }
    };

    let mut counts = FkCounts {
        checked: 0,
        violations: 0,
    };
    for (idx, row) in rows.iter().enumerate() {
        let Some(tuple) = complete_tuple(row, &fk.columns) else {
            continue;
        };
        counts.checked += 1;
        if !parent_keys.contains(&tuple_key(&tuple)) {
            counts.violations += 1;
            violations.push(Violation {
                code: "foreign_key".to_string(),
                path: format!("{}.{}", table.name, fk.label()),
                message: "broken foreign key reference".to_string(),
                row_index: Some(idx as u64 + 1),
                example: Some(display_tuple(&tuple)),
            });
        }
    }

    Some(counts)
}

fn summarize(report: &ValidationReport) -> ValidationSummary {
    let mut summary = ValidationSummary {
        tables: report.tables.len() as u64,
        ..ValidationSummary::default()
    };
    for table in report.tables.values() {
        summary.rows += table.row_count;
        summary.pk_duplicates += table.pk_duplicates;
        summary.fk_violations += table.fk_violations;
        summary.not_null_violations += table.not_null_violations;
    }
    summary.passed = summary.total_violations() == 0;
    summary
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// Tuple of `columns`, or `None` when any member is null or missing.
fn complete_tuple(row: &Row, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|column| Some(cell(row, column)).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn display_tuple(tuple: &[Value]) -> String {
    tuple
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn sort_warnings(warnings: &mut [WarningItem]) {
    warnings
        .sort_by(|a, b| (a.path.clone(), a.code.clone()).cmp(&(b.path.clone(), b.code.clone())));
}

fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (
            a.path.clone(),
            a.code.clone(),
            a.row_index.unwrap_or_default(),
        )
            .cmp(&(
                b.path.clone(),
                b.code.clone(),
                b.row_index.unwrap_or_default(),
            ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddlsynth_core::ColumnDef;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn incomplete_tuples_are_skipped() {
        let mut table = TableDef::new("t");
        table
            .columns
            .insert("a".to_string(), ColumnDef::new("int", true));
        table
            .columns
            .insert("b".to_string(), ColumnDef::new("int", true));
        table.primary_key = vec!["a".to_string(), "b".to_string()];

        let rows = vec![
            row(&[("a", Value::Int(1)), ("b", Value::Null)]),
            row(&[("a", Value::Int(1)), ("b", Value::Null)]),
            row(&[("a", Value::Int(1)), ("b", Value::Int(2))]),
            row(&[("a", Value::Int(1)), ("b", Value::Int(2))]),
        ];
        let mut violations = Vec::new();
        assert_eq!(evaluate_primary_key(&table, &rows, &mut violations), 1);
        assert_eq!(violations[0].row_index, Some(4));
        assert_eq!(violations[0].example.as_deref(), Some("1,2"));
    }

    #[test]
    fn coverage_defaults_to_full_without_children() {
        let counts = FkCounts {
            checked: 0,
            violations: 0,
        };
        assert_eq!(counts.covered_pct(), 100.0);
        let counts = FkCounts {
            checked: 3,
            violations: 1,
        };
        assert_eq!(counts.covered_pct(), 66.67);
    }
}
