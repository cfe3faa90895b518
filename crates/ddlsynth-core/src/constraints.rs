use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Foreign key definition preserving column ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub reference_table: String,
    #[serde(default)]
    pub reference_columns: Vec<String>,
}

impl ForeignKey {
    /// True when the key links exactly one child column to one parent column.
    pub fn is_simple(&self) -> bool {
        self.columns.len() == 1 && self.reference_columns.len() == 1
    }

    /// Human-readable label used in reports (`col -> parent(col)`).
    pub fn label(&self) -> String {
        format!(
            "{} -> {}({})",
            self.columns.join(","),
            self.reference_table,
            self.reference_columns.join(",")
        )
    }

    /// Pairs of (child column, parent column).
    pub fn column_pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.columns.iter().zip(self.reference_columns.iter())
    }
}

/// Check constraint preserved as metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    /// Owning column for inline checks; `None` for table-level checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub expression: String,
}
