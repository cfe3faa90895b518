use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::schema::Schema;

/// Emit the JSON Schema for `schema.json`.
pub fn schema_json_schema() -> RootSchema {
    schema_for!(Schema)
}
