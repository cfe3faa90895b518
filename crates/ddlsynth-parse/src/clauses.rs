//! Inline clauses that commonly trip the grammars: CHECK, ENUM and
//! column COMMENT.

use std::sync::LazyLock;

use ddlsynth_core::CheckConstraint;
use regex::Regex;

use crate::segment::{canonical_name, matching_paren};

static CHECK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bCONSTRAINT\s+\w+\s+)?\bCHECK\s*\(").expect("valid check regex")
});
static ENUM_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bENUM\s*\(([^)]*)\)").expect("valid enum regex"));
static COLUMN_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\bCOMMENT\s+'(?:[^']|'')*'").expect("valid comment regex")
});
static TABLE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:CONSTRAINT|CHECK|PRIMARY|FOREIGN|UNIQUE|KEY|INDEX|FULLTEXT|SPATIAL|EXCLUDE)\b")
        .expect("valid table clause regex")
});
static LEADING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\w$]+)").expect("valid leading word regex"));

/// Column name of a column definition, or `None` for table-level clauses.
pub fn column_name(part: &str) -> Option<String> {
    let part = part.trim();
    if TABLE_CLAUSE.is_match(part) {
        return None;
    }
    LEADING_WORD
        .captures(part)
        .and_then(|caps| caps.get(1))
        .map(|name| canonical_name(name.as_str()))
}

/// CHECK expressions found in the parts, attributed to their column when
/// declared inline.
pub fn extract_checks(parts: &[String]) -> Vec<CheckConstraint> {
    let mut checks = Vec::new();
    for part in parts {
        let column = column_name(part);
        for (_, open, close) in check_spans(part) {
            let expression = part[open..close].trim();
            if expression.is_empty() {
                continue;
            }
            checks.push(CheckConstraint {
                column: column.clone(),
                expression: expression.to_string(),
            });
        }
    }
    checks
}

/// Remove CHECK clauses; parts that held nothing else are dropped.
pub fn strip_checks(parts: &[String]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| {
            let mut out = String::with_capacity(part.len());
            let mut last = 0usize;
            for (start, _, close) in check_spans(part) {
                out.push_str(&part[last..start]);
                last = close + 1;
            }
            out.push_str(&part[last..]);
            let out = out.trim().to_string();
            (!out.is_empty()).then_some(out)
        })
        .collect()
}

/// Permitted values of `ENUM(...)` columns, in declaration order.
pub fn extract_enums(parts: &[String]) -> Vec<(String, Vec<String>)> {
    parts
        .iter()
        .filter_map(|part| {
            let column = column_name(part)?;
            let caps = ENUM_TYPE.captures(part)?;
            let values = caps
                .get(1)?
                .as_str()
                .split(',')
                .map(|value| value.trim().trim_matches('\'').trim_matches('"').to_string())
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>();
            (!values.is_empty()).then_some((column, values))
        })
        .collect()
}

/// Replace `ENUM(...)` types with `TEXT`.
pub fn strip_enums(parts: &[String]) -> Vec<String> {
    parts
        .iter()
        .map(|part| ENUM_TYPE.replace_all(part, "TEXT").into_owned())
        .collect()
}

/// Remove MySQL `COMMENT '...'` column clauses.
pub fn strip_column_comments(parts: &[String]) -> Vec<String> {
    parts
        .iter()
        .map(|part| COLUMN_COMMENT.replace_all(part, "").trim().to_string())
        .collect()
}

/// `(clause start, expression start, closing paren)` for each CHECK.
fn check_spans(part: &str) -> Vec<(usize, usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0usize;
    while let Some(found) = CHECK_START.find_at(part, cursor) {
        let open = found.end();
        let close = matching_paren(part, open).unwrap_or(part.len().saturating_sub(1));
        if close < open {
            break;
        }
        spans.push((found.start(), open, close));
        cursor = close + 1;
        if cursor >= part.len() {
            break;
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn column_names_skip_table_clauses() {
        assert_eq!(column_name("Price NUMERIC"), Some("price".to_string()));
        assert_eq!(column_name("PRIMARY KEY (id)"), None);
        assert_eq!(column_name("CONSTRAINT c CHECK (a > 0)"), None);
    }

    #[test]
    fn checks_are_extracted_and_stripped() {
        let parts = parts(&[
            "price NUMERIC CHECK (price >= 0) NOT NULL",
            "CONSTRAINT qty_range CHECK (qty BETWEEN 1 AND (10))",
        ]);

        let checks = extract_checks(&parts);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].column.as_deref(), Some("price"));
        assert_eq!(checks[0].expression, "price >= 0");
        assert_eq!(checks[1].column, None);
        assert_eq!(checks[1].expression, "qty BETWEEN 1 AND (10)");

        assert_eq!(strip_checks(&parts), vec!["price NUMERIC  NOT NULL"]);
    }

    #[test]
    fn enums_and_comments() {
        let parts = parts(&["status ENUM('new', 'done') NOT NULL COMMENT 'state, ''quoted'''"]);

        assert_eq!(
            extract_enums(&parts),
            vec![(
                "status".to_string(),
                vec!["new".to_string(), "done".to_string()]
            )]
        );
        let stripped = strip_column_comments(&strip_enums(&parts));
        assert_eq!(stripped, vec!["status TEXT NOT NULL"]);
    }
}
