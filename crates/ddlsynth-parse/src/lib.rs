//! DDL to schema recovery for ddlsynth.
//!
//! [`SchemaParser`] sanitizes the input, splits it into `CREATE TABLE`
//! blocks and recovers each through a cascade of `sqlparser` grammars over
//! progressively simplified statements, falling back to regex salvage. Only
//! when nothing at all is recovered does it ask the completion service.

pub mod clauses;
pub mod dialect;
pub mod enhance;
pub mod errors;
pub mod fallback;
pub mod salvage;
pub mod sanitize;
pub mod segment;

use std::sync::Arc;

use ddlsynth_ai::CompletionClient;
use ddlsynth_core::{Schema, TableDef, reconcile_references};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub use errors::ParseError;
pub use fallback::normalize_schema;
pub use sanitize::sanitize;

use crate::segment::TableBlock;

/// Schema recovery entry point.
#[derive(Clone, Default)]
pub struct SchemaParser {
    client: Option<Arc<dyn CompletionClient>>,
    enhance: bool,
}

impl SchemaParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion service used for the zero-table fallback and enhancement.
    pub fn with_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Enable the value-hint enhancement pass (needs a client).
    pub fn with_enhancement(mut self, enhance: bool) -> Self {
        self.enhance = enhance;
        self
    }

    /// Recover a schema, consulting the completion service when configured.
    pub async fn parse(&self, ddl: &str) -> Result<Schema, ParseError> {
        let (mut schema, sanitized) = recover_tables(ddl);

        if schema.tables.is_empty() {
            let Some(client) = self.client.as_deref() else {
                warn!("no tables recovered and no completion service configured");
                return Err(ParseError::NoTables);
            };
            info!("no tables recovered locally; asking completion service");
            let recovered = fallback::schema_from_completion(client, &sanitized)
                .await
                .map_err(|err| {
                    warn!(error = %err, "schema fallback failed");
                    ParseError::NoTables
                })?;
            schema.tables = recovered.tables;
            schema
                .meta
                .parse_warnings
                .push("schema recovered by completion fallback".to_string());
        }

        finish(&mut schema);

        if self.enhance {
            match self.client.as_deref() {
                Some(client) => enhance::enhance_schema(client, &mut schema).await,
                None => schema
                    .meta
                    .parse_warnings
                    .push("enhancement skipped: no completion service configured".to_string()),
            }
        }
        Ok(schema)
    }

    /// Recover a schema without the completion service.
    pub fn parse_offline(&self, ddl: &str) -> Result<Schema, ParseError> {
        let (mut schema, _) = recover_tables(ddl);
        if schema.tables.is_empty() {
            return Err(ParseError::NoTables);
        }
        finish(&mut schema);
        Ok(schema)
    }
}

/// Load a schema previously serialized as JSON, re-running the reference
/// consistency pass over it.
pub fn schema_from_json(json: &str) -> Result<Schema, ParseError> {
    let mut schema: Schema = serde_json::from_str(json)?;
    if schema.tables.is_empty() {
        return Err(ParseError::NoTables);
    }
    finish(&mut schema);
    Ok(schema)
}

/// Local recovery: sanitize, segment and run the per-block cascade.
fn recover_tables(ddl: &str) -> (Schema, String) {
    let sanitized = sanitize(ddl);
    let mut schema = Schema::default();
    schema.meta.fingerprint = Some(fingerprint(&sanitized));

    let blocks = segment::segment(&sanitized);
    debug!(blocks = blocks.len(), "segmented ddl");
    for block in &blocks {
        if schema.tables.contains_key(&block.name) {
            schema
                .meta
                .parse_warnings
                .push(format!("{}: duplicate definition ignored", block.name));
            continue;
        }
        let table = recover_block(block, &mut schema.meta.parse_warnings);
        for (column, values) in clauses::extract_enums(&block.parts) {
            schema
                .meta
                .enums
                .insert(format!("{}.{column}", block.name), values);
        }
        schema.tables.insert(block.name.clone(), table);
    }
    apply_enums(&mut schema);

    (schema, sanitized)
}

fn recover_block(block: &TableBlock, warnings: &mut Vec<String>) -> TableDef {
    if block.truncated {
        warnings.push(format!("{}: statement is missing its closing parenthesis", block.name));
    }

    let mut table = match dialect::parse_with_grammars(block) {
        Some(found) => {
            if found.is_fallback() {
                warnings.push(format!(
                    "{}: parsed with {} grammar ({} variant)",
                    block.name,
                    found.grammar.name(),
                    found.variant.name()
                ));
            }
            debug!(
                table = %block.name,
                grammar = found.grammar.name(),
                variant = found.variant.name(),
                "table recovered"
            );
            found.table
        }
        None => {
            warn!(table = %block.name, "all grammars rejected table; salvaging with patterns");
            warnings.push(format!("{}: recovered by pattern salvage", block.name));
            salvage::salvage_table(block)
        }
    };

    table.checks = clauses::extract_checks(&block.parts);
    table
}

/// Enumerated columns are carried as `TEXT` with their permitted values.
fn apply_enums(schema: &mut Schema) {
    for (key, values) in &schema.meta.enums {
        let Some((table, column)) = key.split_once('.') else {
            continue;
        };
        if let Some(def) = schema
            .tables
            .get_mut(table)
            .and_then(|table| table.columns.get_mut(column))
        {
            def.data_type = "TEXT".to_string();
            def.enum_values = Some(values.clone());
        }
    }
}

fn finish(schema: &mut Schema) {
    let warnings = reconcile_references(schema);
    for warning in &warnings {
        warn!(%warning, "schema reference reconciled");
    }
    schema.meta.parse_warnings.extend(warnings);
    info!(
        tables = schema.tables.len(),
        warnings = schema.meta.parse_warnings.len(),
        "schema recovered"
    );
}

fn fingerprint(sanitized: &str) -> String {
    hex::encode(Sha256::digest(sanitized.as_bytes()))
}
