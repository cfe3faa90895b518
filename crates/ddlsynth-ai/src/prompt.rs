use ddlsynth_core::{Schema, TableDef};
use ddlsynth_generate::GenerationConfig;

use crate::client::CompletionRequest;

pub const SYSTEM_PROMPT: &str = "You generate realistic synthetic rows for relational database tables. \
Respond with JSON only.";

const STRICT_SUFFIX: &str = "Return ONLY a JSON array of objects. No prose, no markdown, no comments.";

/// Build the completion request for one table.
///
/// `strict` adds the JSON-only instruction used on retries.
pub fn table_request(
    schema: &Schema,
    table: &TableDef,
    config: &GenerationConfig,
    temperature: Option<f32>,
    strict: bool,
) -> CompletionRequest {
    CompletionRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        prompt: table_prompt(schema, table, config, strict),
        temperature,
        max_tokens: config.max_tokens,
    }
}

pub fn table_prompt(
    schema: &Schema,
    table: &TableDef,
    config: &GenerationConfig,
    strict: bool,
) -> String {
    let rows = config.rows_for(&table.name);
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Generate {rows} rows for the table \"{}\".\n\n",
        table.name
    ));
    prompt.push_str("Columns:\n");
    for (name, column) in &table.columns {
        prompt.push_str(&format!("- {name} {}", column.data_type));
        if !column.nullable {
            prompt.push_str(" NOT NULL");
        }
        if table.primary_key.iter().any(|pk| pk == name) {
            prompt.push_str(" PRIMARY KEY");
        }
        if let Some((fk, idx)) = table.foreign_key_for(name) {
            let target = fk
                .reference_columns
                .get(idx)
                .map(String::as_str)
                .unwrap_or("?");
            prompt.push_str(&format!(" REFERENCES {}({target})", fk.reference_table));
        }
        if let Some(values) = column.enumeration() {
            prompt.push_str(&format!(" one of [{}]", values.join(", ")));
        }
        prompt.push('\n');
    }

    if let Ok(schema_json) = serde_json::to_string(&schema.tables) {
        prompt.push_str("\nFull schema (JSON):\n");
        prompt.push_str(&schema_json);
        prompt.push('\n');
    }

    if let Some(instructions) = config
        .instructions
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        prompt.push_str("\nInstructions:\n");
        prompt.push_str(instructions.trim());
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nReturn a JSON array of {rows} objects keyed by column name."
    ));
    if strict {
        prompt.push(' ');
        prompt.push_str(STRICT_SUFFIX);
    }

    prompt
}
