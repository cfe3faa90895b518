//! Best-effort value hints from the completion service.

use std::collections::BTreeMap;

use ddlsynth_ai::{CompletionClient, CompletionRequest, extract_json};
use ddlsynth_core::{Schema, ValueHint};
use serde_json::Value;
use tracing::{debug, warn};

const MAX_EXAMPLES: usize = 5;

/// Annotate `meta.value_hints`. Never fails; problems become parse warnings.
pub async fn enhance_schema(client: &dyn CompletionClient, schema: &mut Schema) {
    let prompt = match serde_json::to_string(&schema.tables) {
        Ok(tables) => hint_prompt(&tables),
        Err(err) => {
            schema.meta.parse_warnings.push(format!("enhancement skipped: {err}"));
            return;
        }
    };
    let request = CompletionRequest {
        system: Some("You describe realistic value ranges for database columns. Respond with JSON only.".to_string()),
        prompt,
        temperature: Some(0.2),
        max_tokens: None,
    };

    let text = match client.complete(request).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "schema enhancement failed");
            schema.meta.parse_warnings.push(format!("enhancement failed: {err}"));
            return;
        }
    };
    let hints = match extract_json(&text) {
        Ok(value) => value_hints(schema, &value),
        Err(err) => {
            warn!(error = %err, "schema enhancement returned no JSON");
            schema.meta.parse_warnings.push(format!("enhancement failed: {err}"));
            return;
        }
    };

    debug!(hints = hints.len(), "schema enhancement applied");
    schema.meta.value_hints.extend(hints);
}

fn hint_prompt(tables: &str) -> String {
    format!(
        "For the tables below, suggest value ranges as a JSON object keyed by \
         \"table.column\", each value shaped like {{\"min\": 0, \"max\": 100, \"examples\": [..]}}. \
         Omit columns you have nothing useful to say about.\n\nTables:\n{tables}"
    )
}

/// Hints for `table.column` keys that exist in the schema; others are ignored.
pub fn value_hints(schema: &Schema, value: &Value) -> BTreeMap<String, ValueHint> {
    let Some(object) = value.as_object() else {
        return BTreeMap::new();
    };

    object
        .iter()
        .filter_map(|(key, entry)| {
            let key = key.to_lowercase();
            let (table, column) = key.split_once('.')?;
            schema.tables.get(table)?.columns.get(column)?;
            let entry = entry.as_object()?;
            let hint = ValueHint {
                min: entry.get("min").and_then(Value::as_f64),
                max: entry.get("max").and_then(Value::as_f64),
                examples: entry
                    .get("examples")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().take(MAX_EXAMPLES).cloned().collect())
                    .unwrap_or_default(),
            };
            Some((key, hint))
        })
        .collect()
}
