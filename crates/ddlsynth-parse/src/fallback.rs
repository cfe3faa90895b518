//! Schema recovery through the completion service.

use ddlsynth_ai::{CompletionClient, CompletionRequest, extract_json};
use ddlsynth_core::{ColumnDef, ForeignKey, Schema, TableDef};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::ParseError;
use crate::segment::canonical_name;

const SYSTEM_PROMPT: &str = "You convert SQL DDL into a JSON description of its tables. Respond with JSON only.";

/// Ask the service for a JSON schema and normalize it.
pub async fn schema_from_completion(
    client: &dyn CompletionClient,
    ddl: &str,
) -> Result<Schema, ParseError> {
    let request = CompletionRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        prompt: schema_prompt(ddl),
        temperature: Some(0.0),
        max_tokens: None,
    };
    let text = client.complete(request).await?;
    let value = extract_json(&text).map_err(|err| {
        warn!(error = %err, "schema fallback returned no JSON");
        ParseError::NoTables
    })?;

    let schema = normalize_schema(&value).ok_or(ParseError::NoTables)?;
    info!(tables = schema.tables.len(), "schema recovered by completion fallback");
    Ok(schema)
}

fn schema_prompt(ddl: &str) -> String {
    format!(
        "Extract every table from the DDL below.\n\
         Return a JSON array of objects shaped like\n\
         {{\"name\": \"table\", \"columns\": [{{\"name\": \"col\", \"type\": \"INT\", \"nullable\": false}}], \
         \"primaryKey\": [\"col\"], \"foreignKeys\": [{{\"columns\": [\"col\"], \"referenceTable\": \"other\", \
         \"referenceColumns\": [\"id\"]}}]}}.\n\nDDL:\n{ddl}"
    )
}

/// Canonical schema from the JSON shapes services tend to produce.
///
/// Accepts an array of tables, an object keyed by table name, a `tables`
/// member holding either of those, or any of them nested under a single key.
pub fn normalize_schema(value: &Value) -> Option<Schema> {
    let tables = collect_tables(value, 0)?;
    let mut schema = Schema::default();
    for table in tables {
        schema.tables.entry(table.name.clone()).or_insert(table);
    }
    (!schema.tables.is_empty()).then_some(schema)
}

const MAX_NESTING: usize = 4;

fn collect_tables(value: &Value, depth: usize) -> Option<Vec<TableDef>> {
    if depth > MAX_NESTING {
        return None;
    }
    match value {
        Value::Array(items) => {
            let tables: Vec<TableDef> = items
                .iter()
                .filter_map(|item| item.as_object())
                .filter_map(|object| table_from_object(None, object))
                .collect();
            (!tables.is_empty()).then_some(tables)
        }
        Value::Object(object) => {
            if let Some(tables) = object.get("tables") {
                if let Some(found) = collect_tables(tables, depth + 1) {
                    return Some(found);
                }
            }
            if let Some(table) = table_from_object(None, object) {
                return Some(vec![table]);
            }

            let keyed: Vec<TableDef> = object
                .iter()
                .filter_map(|(key, value)| {
                    value
                        .as_object()
                        .filter(|inner| inner.contains_key("columns"))
                        .and_then(|inner| table_from_object(Some(key), inner))
                })
                .collect();
            if !keyed.is_empty() {
                return Some(keyed);
            }

            if object.len() == 1 {
                return object
                    .values()
                    .next()
                    .and_then(|inner| collect_tables(inner, depth + 1));
            }
            None
        }
        _ => None,
    }
}

fn table_from_object(key: Option<&str>, object: &Map<String, Value>) -> Option<TableDef> {
    let name = ["name", "table", "tableName", "table_name"]
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .or(key)
        .map(canonical_name)?;
    let columns = object.get("columns")?;

    let parsed: Vec<ParsedColumn> = match columns {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| column_from_value(None, item))
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(column, item)| column_from_value(Some(column), item))
            .collect(),
        _ => return None,
    };
    if parsed.is_empty() {
        return None;
    }

    let mut table = TableDef::new(name);
    table.primary_key = ["primaryKey", "primary_key", "pk"]
        .iter()
        .find_map(|field| object.get(*field))
        .map(string_list)
        .unwrap_or_default();
    for column in parsed {
        if column.primary && !table.primary_key.contains(&column.name) {
            table.primary_key.push(column.name.clone());
        }
        table.columns.insert(column.name, column.def);
    }
    for column in &table.primary_key {
        if let Some(def) = table.columns.get_mut(column) {
            def.nullable = false;
        }
    }

    if let Some(Value::Array(fks)) = ["foreignKeys", "foreign_keys", "references"]
        .iter()
        .find_map(|field| object.get(*field))
    {
        table
            .foreign_keys
            .extend(fks.iter().filter_map(|fk| fk.as_object()).filter_map(foreign_key));
    }

    Some(table)
}

struct ParsedColumn {
    name: String,
    def: ColumnDef,
    primary: bool,
}

fn column_from_value(key: Option<&str>, value: &Value) -> Option<ParsedColumn> {
    match value {
        Value::String(data_type) => Some(ParsedColumn {
            name: canonical_name(key?),
            def: ColumnDef::new(data_type.clone(), true),
            primary: false,
        }),
        Value::Object(object) => {
            let name = object
                .get("name")
                .and_then(Value::as_str)
                .or(key)
                .map(canonical_name)?;
            let data_type = ["type", "dataType", "data_type"]
                .iter()
                .find_map(|field| object.get(*field).and_then(Value::as_str))
                .unwrap_or("TEXT");
            let nullable = object
                .get("nullable")
                .and_then(Value::as_bool)
                .or_else(|| object.get("notNull").and_then(Value::as_bool).map(|v| !v))
                .unwrap_or(true);

            let mut def = ColumnDef::new(data_type, nullable);
            def.default = object.get("default").and_then(|value| match value {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            });
            if let Some(values) = object.get("enumValues").or_else(|| object.get("enum")) {
                let values = string_list(values);
                if !values.is_empty() {
                    def.enum_values = Some(values);
                }
            }
            let primary = ["primaryKey", "primary_key", "pk"]
                .iter()
                .any(|field| object.get(*field).and_then(Value::as_bool) == Some(true));
            Some(ParsedColumn { name, def, primary })
        }
        _ => None,
    }
}

fn foreign_key(object: &Map<String, Value>) -> Option<ForeignKey> {
    let columns = ["columns", "column"]
        .iter()
        .find_map(|field| object.get(*field))
        .map(string_list)?;
    let reference_table = ["referenceTable", "references", "refTable", "table"]
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .map(canonical_name)?;
    let reference_columns = ["referenceColumns", "refColumns", "referencedColumns"]
        .iter()
        .find_map(|field| object.get(*field))
        .map(string_list)
        .unwrap_or_default();
    (!columns.is_empty()).then_some(ForeignKey {
        columns,
        reference_table,
        reference_columns,
    })
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => text
            .split(',')
            .map(|item| canonical_name(item.trim()))
            .filter(|item| !item.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(canonical_name)
            .filter(|item| !item.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
