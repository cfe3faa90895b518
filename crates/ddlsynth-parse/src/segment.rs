//! Statement segmentation with balanced-paren matching.

use std::sync::LazyLock;

use regex::Regex;

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bCREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:GLOBAL|LOCAL)\s+)?(?:TEMP(?:ORARY)?\s+|UNLOGGED\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w.$]+)\s*\(",
    )
    .expect("valid create table regex")
});

/// One `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    /// Canonical (lowercased, unqualified) table name.
    pub name: String,
    /// Name as written, possibly schema-qualified.
    pub raw_name: String,
    /// Top-level definitions between the outer parentheses.
    pub parts: Vec<String>,
    /// Whether the closing parenthesis was missing.
    pub truncated: bool,
}

impl TableBlock {
    /// Render the block back into a single statement.
    pub fn statement(&self) -> String {
        render(&self.raw_name, &self.parts)
    }
}

pub fn render(raw_name: &str, parts: &[String]) -> String {
    format!("CREATE TABLE {} ({});", raw_name, parts.join(", "))
}

/// Canonical table or column name: unqualified and lowercased.
pub fn canonical_name(raw: &str) -> String {
    raw.rsplit('.')
        .next()
        .unwrap_or(raw)
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_lowercase()
}

/// Split sanitized DDL into one block per `CREATE TABLE` statement.
pub fn segment(sql: &str) -> Vec<TableBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;

    while let Some(caps) = CREATE_TABLE.captures_at(sql, cursor) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body_start = whole.end();
        let (body, end, truncated) = match matching_paren(sql, body_start) {
            Some(close) => (&sql[body_start..close], close + 1, false),
            None => (&sql[body_start..], sql.len(), true),
        };

        let parts = split_top_level(body)
            .into_iter()
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        blocks.push(TableBlock {
            name: canonical_name(name.as_str()),
            raw_name: name.as_str().to_string(),
            parts,
            truncated,
        });
        cursor = end.max(whole.end());
    }

    blocks
}

/// Byte index of the `)` closing a paren opened just before `start`.
pub fn matching_paren(text: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut chars = text[start..].char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if in_string {
            if ch == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        match ch {
            '\'' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Split on commas that are outside parentheses and string literals.
pub fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;

    for ch in body.chars() {
        if in_string {
            current.push(ch);
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_string = true;
                current.push(ch);
            }
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);

    parts
}
