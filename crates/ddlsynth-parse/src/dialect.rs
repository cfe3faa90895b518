//! Grammar cascade over progressively simplified statement variants.

use ddlsynth_core::{ColumnDef, ForeignKey, TableDef};
use sqlparser::ast::{ColumnOption, Expr, Ident, Statement, TableConstraint, Value as SqlValue};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::debug;

use crate::clauses::{strip_checks, strip_column_comments, strip_enums};
use crate::segment::{TableBlock, canonical_name, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    PostgreSql,
    MySql,
    Sqlite,
    Generic,
}

impl Grammar {
    pub const ALL: [Grammar; 4] = [
        Grammar::PostgreSql,
        Grammar::MySql,
        Grammar::Sqlite,
        Grammar::Generic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Grammar::PostgreSql => "postgresql",
            Grammar::MySql => "mysql",
            Grammar::Sqlite => "sqlite",
            Grammar::Generic => "generic",
        }
    }

    fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Grammar::PostgreSql => Box::new(PostgreSqlDialect {}),
            Grammar::MySql => Box::new(MySqlDialect {}),
            Grammar::Sqlite => Box::new(SQLiteDialect {}),
            Grammar::Generic => Box::new(GenericDialect {}),
        }
    }
}

/// Statement simplifications, each including the previous ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Original,
    ChecksStripped,
    EnumsStripped,
    CommentsStripped,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Original,
        Variant::ChecksStripped,
        Variant::EnumsStripped,
        Variant::CommentsStripped,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Original => "original",
            Variant::ChecksStripped => "checks stripped",
            Variant::EnumsStripped => "enums stripped",
            Variant::CommentsStripped => "comments stripped",
        }
    }

    pub fn apply(self, parts: &[String]) -> Vec<String> {
        match self {
            Variant::Original => parts.to_vec(),
            Variant::ChecksStripped => strip_checks(parts),
            Variant::EnumsStripped => strip_enums(&strip_checks(parts)),
            Variant::CommentsStripped => strip_column_comments(&strip_enums(&strip_checks(parts))),
        }
    }
}

/// A table recovered by one of the grammars.
#[derive(Debug, Clone)]
pub struct GrammarMatch {
    pub table: TableDef,
    pub grammar: Grammar,
    pub variant: Variant,
}

impl GrammarMatch {
    /// Whether recovery needed anything beyond the first grammar on the
    /// unmodified statement.
    pub fn is_fallback(&self) -> bool {
        self.grammar != Grammar::PostgreSql || self.variant != Variant::Original
    }
}

/// First variant/grammar combination that yields this block's table.
pub fn parse_with_grammars(block: &TableBlock) -> Option<GrammarMatch> {
    for variant in Variant::ALL {
        let statement = render(&block.raw_name, &variant.apply(&block.parts));
        for grammar in Grammar::ALL {
            let dialect = grammar.dialect();
            let statements = match Parser::parse_sql(dialect.as_ref(), &statement) {
                Ok(statements) => statements,
                Err(err) => {
                    debug!(
                        table = %block.name,
                        grammar = grammar.name(),
                        variant = variant.name(),
                        error = %err,
                        "grammar rejected statement"
                    );
                    continue;
                }
            };
            if let Some(table) = statements
                .into_iter()
                .find_map(|statement| table_from_statement(statement, &block.name))
            {
                return Some(GrammarMatch {
                    table,
                    grammar,
                    variant,
                });
            }
        }
    }
    None
}

fn table_from_statement(statement: Statement, expected: &str) -> Option<TableDef> {
    let Statement::CreateTable {
        name,
        columns,
        constraints,
        ..
    } = statement
    else {
        return None;
    };
    if canonical_name(&name.to_string()) != expected {
        return None;
    }

    let mut table = TableDef::new(expected);
    for column in columns {
        let column_name = ident(&column.name);
        let mut def = ColumnDef::new(column.data_type.to_string(), true);
        for option in column.options {
            match option.option {
                ColumnOption::NotNull => def.nullable = false,
                ColumnOption::Null => def.nullable = true,
                ColumnOption::Default(expr) => def.default = Some(default_text(&expr)),
                ColumnOption::Unique {
                    is_primary: true, ..
                } => {
                    if !table.primary_key.contains(&column_name) {
                        table.primary_key.push(column_name.clone());
                    }
                }
                ColumnOption::ForeignKey {
                    foreign_table,
                    referred_columns,
                    ..
                } => table.foreign_keys.push(ForeignKey {
                    columns: vec![column_name.clone()],
                    reference_table: canonical_name(&foreign_table.to_string()),
                    reference_columns: referred_columns.iter().map(ident).collect(),
                }),
                _ => {}
            }
        }
        table.columns.insert(column_name, def);
    }

    for constraint in constraints {
        match constraint {
            TableConstraint::Unique {
                columns,
                is_primary: true,
                ..
            } => table.primary_key = columns.iter().map(ident).collect(),
            TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => table.foreign_keys.push(ForeignKey {
                columns: columns.iter().map(ident).collect(),
                reference_table: canonical_name(&foreign_table.to_string()),
                reference_columns: referred_columns.iter().map(ident).collect(),
            }),
            _ => {}
        }
    }

    for column in &table.primary_key {
        if let Some(def) = table.columns.get_mut(column) {
            def.nullable = false;
        }
    }

    Some(table)
}

fn ident(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn default_text(expr: &Expr) -> String {
    match expr {
        Expr::Value(SqlValue::SingleQuotedString(text)) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;

    #[test]
    fn postgres_statement_parses_first_try() {
        let blocks = segment(
            "CREATE TABLE Books (id SERIAL PRIMARY KEY, author_id INT NOT NULL REFERENCES authors(id), title VARCHAR(200));",
        );
        let found = parse_with_grammars(&blocks[0]).expect("parsed");

        assert!(!found.is_fallback());
        let table = found.table;
        assert_eq!(table.name, "books");
        assert_eq!(table.primary_key, vec!["id"]);
        assert!(!table.columns["id"].nullable);
        assert!(!table.columns["author_id"].nullable);
        assert!(table.columns["title"].nullable);
        assert_eq!(table.columns["title"].data_type, "VARCHAR(200)");
        assert_eq!(table.foreign_keys[0].reference_table, "authors");
        assert_eq!(table.foreign_keys[0].reference_columns, vec!["id"]);
    }

    #[test]
    fn serial_marker_becomes_default() {
        let blocks = segment("CREATE TABLE t (id INT NOT NULL DEFAULT 'serial', PRIMARY KEY (id));");
        let found = parse_with_grammars(&blocks[0]).expect("parsed");
        assert_eq!(found.table.columns["id"].default.as_deref(), Some("serial"));
        assert_eq!(found.table.primary_key, vec!["id"]);
    }

    #[test]
    fn inline_comments_are_recovered_by_a_later_variant() {
        let blocks = segment(
            "CREATE TABLE t (id INT CHECK (id > 0) COMMENT 'row id', status ENUM('a','b'));",
        );
        let found = parse_with_grammars(&blocks[0]).expect("parsed");
        assert!(found.table.columns.contains_key("id"));
        assert!(found.table.columns.contains_key("status"));
    }

    #[test]
    fn variants_are_cumulative() {
        let parts = vec![
            "id INT CHECK (id > 0) COMMENT 'x'".to_string(),
            "kind ENUM('a')".to_string(),
        ];
        assert_eq!(
            Variant::CommentsStripped.apply(&parts),
            vec!["id INT", "kind TEXT"]
        );
        assert_eq!(Variant::Original.apply(&parts), parts);
    }

    #[test]
    fn hopeless_statement_is_rejected() {
        let blocks = segment("CREATE TABLE t (id INT ,, ??? weird);");
        assert!(parse_with_grammars(&blocks[0]).is_none());
    }
}
