//! Defensive parsing of completion output into table records.

use std::sync::LazyLock;

use ddlsynth_core::{Row, TableDef, Value};
use regex::Regex;
use serde_json::Map;

use crate::errors::ResponseError;

/// Fields kept per record; the rest are dropped.
pub const MAX_FIELDS_PER_RECORD: usize = 64;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("valid fence regex"));

/// JSON shapes a completion is allowed to take.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// Top-level array of records.
    Rows(Vec<serde_json::Value>),
    /// Object whose table-named (or first) value is an array of records.
    Keyed {
        key: String,
        rows: Vec<serde_json::Value>,
    },
    /// A single object record.
    Single(Map<String, serde_json::Value>),
}

impl ResponseShape {
    pub fn into_values(self) -> Vec<serde_json::Value> {
        match self {
            ResponseShape::Rows(rows) => rows,
            ResponseShape::Keyed { rows, .. } => rows,
            ResponseShape::Single(record) => vec![serde_json::Value::Object(record)],
        }
    }
}

/// Parse completion text for `table` into a tagged shape.
pub fn parse_response(text: &str, table: &str) -> Result<ResponseShape, ResponseError> {
    classify(extract_json(text)?, table)
}

/// Locate and parse the outermost JSON value in free-form completion text.
///
/// Markdown fences and surrounding prose are ignored; trailing commas are
/// tolerated.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ResponseError> {
    let unfenced = strip_fences(text);
    let candidate = outermost_json(&unfenced).ok_or(ResponseError::NoJson)?;
    let cleaned = drop_trailing_commas(candidate);
    serde_json::from_str(&cleaned).map_err(|err| ResponseError::Json(err.to_string()))
}

/// Records of a parsed shape, projected onto the table's column set.
///
/// Null and non-object entries are dropped; bare primitives become a record
/// keyed by the first column. Missing columns are filled with null.
pub fn records_for_table(shape: ResponseShape, table: &TableDef) -> Vec<Row> {
    let first_column = table.columns.keys().next();
    shape
        .into_values()
        .into_iter()
        .filter_map(|entry| match entry {
            serde_json::Value::Object(record) => Some(record),
            serde_json::Value::Null | serde_json::Value::Array(_) => None,
            primitive => first_column.map(|column| {
                let mut record = Map::new();
                record.insert(column.clone(), primitive);
                record
            }),
        })
        .map(|record| project(record, table))
        .collect()
}

fn classify(value: serde_json::Value, table: &str) -> Result<ResponseShape, ResponseError> {
    match value {
        serde_json::Value::Array(rows) => Ok(ResponseShape::Rows(rows)),
        serde_json::Value::Object(mut object) => {
            let named = object
                .iter()
                .find(|(key, value)| key.eq_ignore_ascii_case(table) && value.is_array())
                .map(|(key, _)| key.clone());
            let key = named.or_else(|| {
                object
                    .iter()
                    .next()
                    .filter(|(_, value)| value.is_array())
                    .map(|(key, _)| key.clone())
            });
            match key {
                Some(key) => match object.remove(&key) {
                    Some(serde_json::Value::Array(rows)) => Ok(ResponseShape::Keyed { key, rows }),
                    _ => Err(ResponseError::Unrecognized(format!("key '{key}'"))),
                },
                None if object.is_empty() => {
                    Err(ResponseError::Unrecognized("empty object".to_string()))
                }
                None => Ok(ResponseShape::Single(object)),
            }
        }
        other => Err(ResponseError::Unrecognized(json_kind(&other).to_string())),
    }
}

fn project(record: Map<String, serde_json::Value>, table: &TableDef) -> Row {
    let record: Map<String, serde_json::Value> =
        record.into_iter().take(MAX_FIELDS_PER_RECORD).collect();
    table
        .columns
        .keys()
        .map(|column| {
            let value = record
                .get(column)
                .or_else(|| {
                    record
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(column))
                        .map(|(_, value)| value)
                })
                .cloned()
                .map(Value::from)
                .unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect()
}

fn strip_fences(text: &str) -> String {
    match FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().to_string(),
        None => text.replace("```", ""),
    }
}

/// Slice from the first `[`/`{` to its balanced close, or to the last
/// matching closer when the text is truncated.
fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let open = text[start..].chars().next()?;
    let close = if open == '[' { ']' } else { '}' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Remove commas that directly precede `]` or `}` outside string literals.
fn drop_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_comma = false;
    let mut pending_ws = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if pending_comma {
            if ch.is_whitespace() {
                pending_ws.push(ch);
                continue;
            }
            if ch != ']' && ch != '}' {
                out.push(',');
            }
            out.push_str(&pending_ws);
            pending_ws.clear();
            pending_comma = false;
        }
        match ch {
            ',' => pending_comma = true,
            '"' => {
                in_string = true;
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    if pending_comma {
        out.push(',');
    }
    out.push_str(&pending_ws);
    out
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
