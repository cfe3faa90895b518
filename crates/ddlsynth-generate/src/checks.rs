use std::collections::HashMap;
use std::sync::LazyLock;

use ddlsynth_core::{Schema, TableDef};
use regex::Regex;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\(?\s*(\w+)\s*\)?\s*(>=|<=|>|<)\s*\(?\s*(-?[\d.]+)\s*\)?\s*$")
        .expect("valid comparison regex")
});
static BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\(?\s*(\w+)\s+between\s+(-?[\d.]+)\s+and\s+(-?[\d.]+)\s*\)?\s*$")
        .expect("valid between regex")
});
static IN_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\(?\s*(\w+)\s+in\s*\(([^)]*)\)\s*\)?\s*$").expect("valid in-list regex")
});

/// Inclusive numeric range derived from CHECK expressions and value hints.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumericBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericBounds {
    pub fn is_bounded(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Clamp a value into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }

    fn tighten(&mut self, min: Option<f64>, max: Option<f64>) {
        if let Some(min) = min {
            self.min = Some(self.min.map(|v| v.max(min)).unwrap_or(min));
        }
        if let Some(max) = max {
            self.max = Some(self.max.map(|v| v.min(max)).unwrap_or(max));
        }
    }
}

/// Column constraints a generator can honor without a full expression evaluator.
#[derive(Debug, Clone, Default)]
pub struct ColumnConstraints {
    pub bounds: HashMap<String, NumericBounds>,
    pub allowed: HashMap<String, Vec<String>>,
}

impl ColumnConstraints {
    /// Collect bounds and `IN` lists from a table's checks plus schema value hints.
    pub fn for_table(schema: &Schema, table: &TableDef) -> Self {
        let mut constraints = Self::default();

        for check in &table.checks {
            for part in split_conjunction(&check.expression) {
                constraints.apply(&part);
            }
        }

        for name in table.columns.keys() {
            if let Some(hint) = schema.meta.value_hint(&table.name, name) {
                if hint.min.is_some() || hint.max.is_some() {
                    constraints
                        .bounds
                        .entry(name.clone())
                        .or_default()
                        .tighten(hint.min, hint.max);
                }
            }
        }

        constraints
            .bounds
            .retain(|column, _| table.columns.contains_key(column));
        constraints
            .allowed
            .retain(|column, values| table.columns.contains_key(column) && !values.is_empty());
        constraints
    }

    pub fn bounds(&self, column: &str) -> Option<&NumericBounds> {
        self.bounds.get(column).filter(|bounds| bounds.is_bounded())
    }

    pub fn allowed(&self, column: &str) -> Option<&[String]> {
        self.allowed.get(column).map(Vec::as_slice)
    }

    fn apply(&mut self, expr: &str) {
        if let Some(caps) = BETWEEN.captures(expr) {
            let min = caps[2].parse::<f64>().ok();
            let max = caps[3].parse::<f64>().ok();
            self.bounds
                .entry(caps[1].to_lowercase())
                .or_default()
                .tighten(min, max);
            return;
        }

        if let Some(caps) = COMPARISON.captures(expr) {
            let Ok(value) = caps[3].parse::<f64>() else {
                return;
            };
            let entry = self.bounds.entry(caps[1].to_lowercase()).or_default();
            match &caps[2] {
                ">=" => entry.tighten(Some(value), None),
                ">" => entry.tighten(Some(value + 1.0), None),
                "<=" => entry.tighten(None, Some(value)),
                "<" => entry.tighten(None, Some(value - 1.0)),
                _ => {}
            }
            return;
        }

        if let Some(caps) = IN_LIST.captures(expr) {
            let values = caps[2]
                .split(',')
                .map(|value| value.trim().trim_matches('\'').trim_matches('"').to_string())
                .filter(|value| !value.is_empty())
                .collect();
            self.allowed.insert(caps[1].to_lowercase(), values);
        }
    }
}

fn split_conjunction(expression: &str) -> Vec<String> {
    let trimmed = expression.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .filter(|inner| balanced(inner))
        .unwrap_or(trimmed);

    if BETWEEN.is_match(inner) {
        return vec![inner.to_string()];
    }

    let lowered = inner.to_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, _) in lowered.match_indices(" and ") {
        parts.push(inner[start..idx].to_string());
        start = idx + " and ".len();
    }
    parts.push(inner[start..].to_string());
    parts
}

fn balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    for ch in expr.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
