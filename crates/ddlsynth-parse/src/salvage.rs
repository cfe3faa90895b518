//! Regex salvage for statements no grammar accepts.

use std::sync::LazyLock;

use ddlsynth_core::{ColumnDef, ForeignKey, TableDef};
use regex::Regex;

use crate::clauses::strip_checks;
use crate::segment::{TableBlock, canonical_name};

static PRIMARY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:CONSTRAINT\s+[\w$]+\s+)?PRIMARY\s+KEY\s*(?:\w+\s*)?\(([^)]*)\)")
        .expect("valid primary key regex")
});
static FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:CONSTRAINT\s+[\w$]+\s+)?FOREIGN\s+KEY\s*\(([^)]*)\)\s*REFERENCES\s+([\w.$]+)\s*(?:\(([^)]*)\))?",
    )
    .expect("valid foreign key regex")
});
static OTHER_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:CONSTRAINT|UNIQUE|KEY|INDEX|FULLTEXT|SPATIAL|EXCLUDE|CHECK)\b")
        .expect("valid clause regex")
});
static COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([\w$]+)\s+((?:double\s+precision|character\s+varying|[a-z_][\w]*)(?:\s*\([^)]*\))?(?:\s+unsigned)?)(.*)$",
    )
    .expect("valid column regex")
});
static NOT_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bNOT\s+NULL\b").expect("valid not null regex"));
static INLINE_PRIMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPRIMARY\s+KEY\b").expect("valid inline pk regex"));
static INLINE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bREFERENCES\s+([\w.$]+)\s*(?:\(([^)]*)\))?").expect("valid references regex")
});
static DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDEFAULT\s+('(?:[^']|'')*'|[\w.()+-]+)").expect("valid default regex")
});
static RESERVED_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:NOT|NULL|DEFAULT|PRIMARY|REFERENCES)$").expect("valid reserved regex")
});

/// Best-effort table definition from a block's top-level parts.
///
/// Always returns a table, possibly without columns.
pub fn salvage_table(block: &TableBlock) -> TableDef {
    let mut table = TableDef::new(block.name.clone());

    for part in strip_checks(&block.parts) {
        let part = part.trim();

        if let Some(caps) = PRIMARY_KEY.captures(part) {
            table.primary_key = split_names(caps.get(1).map(|m| m.as_str()).unwrap_or_default());
            continue;
        }
        if let Some(caps) = FOREIGN_KEY.captures(part) {
            table.foreign_keys.push(ForeignKey {
                columns: split_names(caps.get(1).map(|m| m.as_str()).unwrap_or_default()),
                reference_table: canonical_name(caps.get(2).map(|m| m.as_str()).unwrap_or_default()),
                reference_columns: split_names(caps.get(3).map(|m| m.as_str()).unwrap_or_default()),
            });
            continue;
        }
        if OTHER_CLAUSE.is_match(part) {
            continue;
        }

        let Some(caps) = COLUMN.captures(part) else {
            continue;
        };
        let (Some(name), Some(data_type)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if RESERVED_START.is_match(data_type.as_str()) {
            continue;
        }
        let name = canonical_name(name.as_str());
        let rest = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

        let mut column = ColumnDef::new(data_type.as_str().trim().to_uppercase(), !NOT_NULL.is_match(rest));
        if let Some(default) = DEFAULT.captures(rest).and_then(|caps| caps.get(1)) {
            column.default = Some(
                default
                    .as_str()
                    .trim_matches('\'')
                    .replace("''", "'"),
            );
        }
        if INLINE_PRIMARY.is_match(rest) && !table.primary_key.contains(&name) {
            table.primary_key.push(name.clone());
        }
        if let Some(reference) = INLINE_REFERENCE.captures(rest) {
            table.foreign_keys.push(ForeignKey {
                columns: vec![name.clone()],
                reference_table: canonical_name(
                    reference.get(1).map(|m| m.as_str()).unwrap_or_default(),
                ),
                reference_columns: split_names(
                    reference.get(2).map(|m| m.as_str()).unwrap_or_default(),
                ),
            });
        }
        table.columns.insert(name, column);
    }

    for column in &table.primary_key {
        if let Some(def) = table.columns.get_mut(column) {
            def.nullable = false;
        }
    }

    table
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|name| canonical_name(name.trim()))
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;

    #[test]
    fn salvages_columns_and_keys() {
        let blocks = segment(
            "CREATE TABLE orders (id integer PRIMARY KEY, customer_id int NOT NULL REFERENCES customers, \
             total double precision DEFAULT 0 ~~ weird, note varchar(20) DEFAULT 'it''s', \
             CONSTRAINT fk_x FOREIGN KEY (a, b) REFERENCES other(x, y), UNIQUE (note), !!!)",
        );
        let table = salvage_table(&blocks[0]);

        assert_eq!(
            table.columns.keys().collect::<Vec<_>>(),
            vec!["id", "customer_id", "total", "note"]
        );
        assert_eq!(table.primary_key, vec!["id"]);
        assert!(!table.columns["id"].nullable);
        assert!(!table.columns["customer_id"].nullable);
        assert_eq!(table.columns["total"].data_type, "DOUBLE PRECISION");
        assert_eq!(table.columns["total"].default.as_deref(), Some("0"));
        assert_eq!(table.columns["note"].data_type, "VARCHAR(20)");
        assert_eq!(table.columns["note"].default.as_deref(), Some("it's"));

        assert_eq!(table.foreign_keys.len(), 2);
        assert_eq!(table.foreign_keys[0].reference_table, "customers");
        assert!(table.foreign_keys[0].reference_columns.is_empty());
        assert_eq!(table.foreign_keys[1].columns, vec!["a", "b"]);
        assert_eq!(table.foreign_keys[1].reference_columns, vec!["x", "y"]);
    }

    #[test]
    fn garbage_yields_empty_table() {
        let blocks = segment("CREATE TABLE junk (???)");
        let table = salvage_table(&blocks[0]);
        assert_eq!(table.name, "junk");
        assert!(table.columns.is_empty());
    }
}
