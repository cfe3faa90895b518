//! Textual normalization applied before any grammar sees the DDL.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Default marker written for auto-increment and identity columns.
pub const SERIAL_MARKER: &str = "serial";

static BATCH_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*GO\s*$").expect("valid batch separator regex"));
static BRACKET_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z_][\w ]*)\]").expect("valid bracket regex"));
static QUOTED_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Za-z_]\w*)""#).expect("valid quoted ident regex"));
static TABLE_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:ENGINE|AUTO_INCREMENT|ROW_FORMAT|(?:DEFAULT\s+)?(?:CHARSET|CHARACTER\s+SET)|(?:DEFAULT\s+)?COLLATE)\s*=\s*\w+",
    )
    .expect("valid table options regex")
});
static COLUMN_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s(?:CHARACTER\s+SET|CHARSET|COLLATE)\s+\w+").expect("valid charset regex")
});
static GENERATED_IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGENERATED\s+(?:ALWAYS|BY\s+DEFAULT)\s+AS\s+IDENTITY(?:\s*\([^)]*\))?")
        .expect("valid identity regex")
});
static IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w+|\))(\s+)IDENTITY\b(?:\s*\(\s*\d+\s*,\s*\d+\s*\))?")
        .expect("valid identity regex")
});
static AUTO_INCREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\w+|\))(\s+)AUTO_?INCREMENT\b").expect("valid auto increment regex")
});

/// Words after which `IDENTITY` or `AUTO_INCREMENT` is a name, not a column attribute.
const NAME_POSITION_KEYWORDS: &[&str] = &[
    "ADD",
    "ALTER",
    "COLUMN",
    "CONSTRAINT",
    "EXISTS",
    "INDEX",
    "ON",
    "REFERENCES",
    "TABLE",
    "TO",
];
static ZONED_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bTIMESTAMP\s*(?:\(\s*\d+\s*\))?\s+WITH(?:OUT)?\s+TIME\s+ZONE\b")
        .expect("valid timestamp regex")
});
static DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:DATETIME2?|TIMESTAMPTZ)\b(?:\s*\(\s*\d+\s*\))?")
        .expect("valid datetime regex")
});
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static TERMINATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*;[\s;]*").expect("valid terminator regex"));

/// Normalize raw DDL into a form the grammars and the salvage pass accept.
///
/// Comments and identifier quoting are removed, vendor-specific
/// auto-increment and timestamp syntax is rewritten, MySQL table options are
/// dropped, whitespace is collapsed and statements end with a single `;`.
pub fn sanitize(ddl: &str) -> String {
    let text = strip_comments(ddl);
    let text = BATCH_SEPARATOR.replace_all(&text, ";");
    let text = text.replace('`', "");
    let text = BRACKET_IDENT.replace_all(&text, "$1");
    let text = QUOTED_IDENT.replace_all(&text, "$1");
    let text = TABLE_OPTIONS.replace_all(&text, "");
    let text = COLUMN_CHARSET.replace_all(&text, "");

    let marker = format!("DEFAULT '{SERIAL_MARKER}'");
    let text = GENERATED_IDENTITY.replace_all(&text, marker.as_str());
    let text = rewrite_column_attribute(&IDENTITY, &text, &marker);
    let text = rewrite_column_attribute(&AUTO_INCREMENT, &text, &marker);

    let text = ZONED_TIMESTAMP.replace_all(&text, "TIMESTAMP");
    let text = DATETIME.replace_all(&text, "TIMESTAMP");

    let text = WHITESPACE.replace_all(&text, " ");
    let text = TERMINATORS.replace_all(text.trim(), "; ");
    let mut text = text.trim().to_string();
    if !text.is_empty() && !text.ends_with(';') {
        text.push(';');
    }
    text
}

/// Replace an auto-increment attribute that follows a column type or
/// constraint. Columns or tables merely named like the keyword are kept.
fn rewrite_column_attribute(pattern: &Regex, text: &str, marker: &str) -> String {
    pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let preceding = &caps[1];
            if NAME_POSITION_KEYWORDS
                .iter()
                .any(|keyword| keyword.eq_ignore_ascii_case(preceding))
            {
                caps[0].to_string()
            } else {
                format!("{preceding}{}{marker}", &caps[2])
            }
        })
        .into_owned()
}

/// Remove `--` line comments and `/* */` block comments outside string literals.
pub fn strip_comments(ddl: &str) -> String {
    let mut out = String::with_capacity(ddl.len());
    let mut chars = ddl.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        match ch {
            '\'' => {
                in_string = true;
                out.push(ch);
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_but_not_strings() {
        let text = "a -- note\nb /* block\n */ c '--kept' 'it''s /* too */'";
        assert_eq!(strip_comments(text), "a \nb   c '--kept' 'it''s /* too */'");
    }

    #[test]
    fn normalizes_mysql_table() {
        let ddl = "CREATE TABLE `users` (\n  `id` INT NOT NULL AUTO_INCREMENT,\n  `created` DATETIME,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;;";
        assert_eq!(
            sanitize(ddl),
            "CREATE TABLE users ( id INT NOT NULL DEFAULT 'serial', created TIMESTAMP, PRIMARY KEY (id) );"
        );
    }

    #[test]
    fn normalizes_identity_and_zoned_timestamps() {
        let ddl = "CREATE TABLE [dbo].[t] ([id] INT IDENTITY(1,1), at TIMESTAMP WITH TIME ZONE)\nGO\nCREATE TABLE u (id BIGINT GENERATED ALWAYS AS IDENTITY, at timestamptz)";
        assert_eq!(
            sanitize(ddl),
            "CREATE TABLE dbo.t (id INT DEFAULT 'serial', at TIMESTAMP); CREATE TABLE u (id BIGINT DEFAULT 'serial', at TIMESTAMP);"
        );
    }

    #[test]
    fn keeps_columns_named_like_identity() {
        let ddl = "CREATE TABLE people (id INT IDENTITY(1,1) PRIMARY KEY, identity_number VARCHAR(20) NOT NULL, identity INT, autoincrement_note TEXT)";
        assert_eq!(
            sanitize(ddl),
            "CREATE TABLE people (id INT DEFAULT 'serial' PRIMARY KEY, identity_number VARCHAR(20) NOT NULL, identity INT, autoincrement_note TEXT);"
        );
    }

    #[test]
    fn keeps_tables_named_identity() {
        let ddl = "CREATE TABLE identity (id INT NOT NULL AUTO_INCREMENT); CREATE TABLE t (ref INT REFERENCES identity (id))";
        assert_eq!(
            sanitize(ddl),
            "CREATE TABLE identity (id INT NOT NULL DEFAULT 'serial'); CREATE TABLE t (ref INT REFERENCES identity (id));"
        );
    }
}
