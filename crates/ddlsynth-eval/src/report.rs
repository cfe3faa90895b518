use crate::model::ValidationReport;

/// Render a deterministic markdown summary of a validation report.
pub fn render_report(report: &ValidationReport) -> String {
    let mut lines = Vec::new();

    lines.push("# ddlsynth Validation Report".to_string());
    lines.push(String::new());
    lines.push("## Summary".to_string());
    lines.push(format!("- tables: {}", report.summary.tables));
    lines.push(format!("- rows: {}", report.summary.rows));
    lines.push(format!(
        "- status: {}",
        if report.summary.passed { "passed" } else { "failed" }
    ));
    lines.push(String::new());

    lines.push("## Tables".to_string());
    lines.push("| table | rows | pk_duplicates | fk_violations | not_null_violations |".to_string());
    lines.push("| --- | --- | --- | --- | --- |".to_string());
    for (name, table) in &report.tables {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            name,
            table.row_count,
            table.pk_duplicates,
            table.fk_violations,
            table.not_null_violations
        ));
    }
    lines.push(String::new());

    let coverage: Vec<String> = report
        .tables
        .iter()
        .flat_map(|(name, table)| {
            table
                .fk_coverage
                .iter()
                .map(move |fk| format!("- {}: {} covers {:.2}%", name, fk.fk, fk.covered_pct))
        })
        .collect();
    if !coverage.is_empty() {
        lines.push("## Foreign key coverage".to_string());
        lines.extend(coverage);
        lines.push(String::new());
    }

    if !report.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &report.warnings {
            lines.push(format!("- {}: {}", warning.path, warning.message));
        }
        lines.push(String::new());
    }

    if !report.violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in &report.violations {
            let row = violation
                .row_index
                .map(|row| format!(" row {row}"))
                .unwrap_or_default();
            let example = violation
                .example
                .as_ref()
                .map(|value| format!(" example={value}"))
                .unwrap_or_default();
            lines.push(format!(
                "- {}{}: {}{}",
                violation.path, row, violation.message, example
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(report));
    lines.join("\n")
}

fn recommendations(report: &ValidationReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.summary.not_null_violations > 0 {
        lines.push("- lower nullProbability for NOT NULL columns.".to_string());
    }
    if report.summary.pk_duplicates > 0 || report.summary.fk_violations > 0 {
        lines.push("- enable integrityRepair to rewrite keys and references.".to_string());
    }
    if report.summary.passed {
        lines.push("- no violations detected.".to_string());
    }
    lines
}
