use std::collections::BTreeMap;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constraints::{CheckConstraint, ForeignKey};
use crate::types::{TypeFamily, type_family};

/// Structured schema recovered from DDL.
///
/// Tables keep their declaration order; the dependency orderer relies on it
/// to break ties deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schema {
    pub tables: IndexMap<String, TableDef>,
    #[serde(default)]
    pub meta: SchemaMeta,
}

/// Recovery diagnostics and side-channel metadata for a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMeta {
    /// One entry per recovery step taken while parsing.
    #[serde(default)]
    pub parse_warnings: Vec<String>,
    /// Enumerations summarized as `table.column -> values`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enums: BTreeMap<String, Vec<String>>,
    /// SHA-256 of the sanitized DDL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Suggested value ranges keyed by `table.column`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_hints: BTreeMap<String, ValueHint>,
}

/// Advisory value range for a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
}

/// A single table definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub name: String,
    pub columns: IndexMap<String, ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckConstraint>,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            data_type: data_type.into(),
            nullable,
            default: None,
            enum_values: None,
        }
    }

    pub fn family(&self) -> TypeFamily {
        type_family(&self.data_type)
    }

    pub fn is_numeric(&self) -> bool {
        self.family().is_numeric()
    }

    /// Declared enumeration, ignoring empty lists.
    pub fn enumeration(&self) -> Option<&[String]> {
        self.enum_values
            .as_deref()
            .filter(|values| !values.is_empty())
    }
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == column)
    }

    /// The FK whose child columns include `column`, if any.
    pub fn foreign_key_for(&self, column: &str) -> Option<(&ForeignKey, usize)> {
        self.foreign_keys.iter().find_map(|fk| {
            fk.columns
                .iter()
                .position(|col| col == column)
                .map(|idx| (fk, idx))
        })
    }
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.meta.parse_warnings.push(message.into());
    }
}

pub(crate) fn column_key(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

impl SchemaMeta {
    pub fn value_hint(&self, table: &str, column: &str) -> Option<&ValueHint> {
        self.value_hints.get(&column_key(table, column))
    }
}
