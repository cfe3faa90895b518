use serde::{Deserialize, Serialize};

/// Coarse type family used to pick a value synthesis strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Integer,
    Serial,
    Boolean,
    Date,
    Time,
    Timestamp,
    Text,
    Uuid,
    Decimal,
    Float,
    Unknown,
}

impl TypeFamily {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeFamily::Integer | TypeFamily::Serial | TypeFamily::Decimal | TypeFamily::Float
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(self, TypeFamily::Integer | TypeFamily::Serial)
    }
}

/// Classify a declared SQL type into a [`TypeFamily`].
///
/// Length/precision arguments and sign modifiers are ignored, so
/// `VARCHAR(255)` and `INT UNSIGNED` classify like `varchar` and `int`.
pub fn type_family(data_type: &str) -> TypeFamily {
    let normalized = normalize_type(data_type);

    match normalized.as_str() {
        "serial" | "serial4" | "bigserial" | "serial8" | "smallserial" | "serial2" => {
            TypeFamily::Serial
        }
        "int" | "integer" | "int1" | "int2" | "int3" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" => TypeFamily::Integer,
        "bool" | "boolean" | "bit" => TypeFamily::Boolean,
        "date" => TypeFamily::Date,
        "uuid" | "uniqueidentifier" => TypeFamily::Uuid,
        "numeric" | "decimal" | "money" | "number" => TypeFamily::Decimal,
        "real" | "float" | "float4" | "float8" | "double" | "double precision" => {
            TypeFamily::Float
        }
        "text" | "varchar" | "char" | "character" | "character varying" | "nvarchar"
        | "nchar" | "string" | "citext" | "tinytext" | "mediumtext" | "longtext" | "clob"
        | "varchar2" | "json" | "jsonb" | "name" => TypeFamily::Text,
        other if other.starts_with("timestamp") || other.starts_with("datetime") => {
            TypeFamily::Timestamp
        }
        other if other.starts_with("time") => TypeFamily::Time,
        _ => TypeFamily::Unknown,
    }
}

fn normalize_type(data_type: &str) -> String {
    let lowered = data_type.to_lowercase();
    let mut without_args = String::with_capacity(lowered.len());
    let mut depth = 0usize;
    for ch in lowered.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => without_args.push(ch),
            _ => {}
        }
    }

    without_args
        .split_whitespace()
        .filter(|word| !matches!(*word, "unsigned" | "signed" | "zerofill"))
        .collect::<Vec<_>>()
        .join(" ")
}
