//! Inventory list filters
//!
//! Grammar: `field = "value" [AND field = "value" ...]`. Field names may be dotted
//! (`nic.resource_id`, `host.uuid`) to reach into nested references.

use crate::error::InventoryError;
use crate::field_mask::lookup;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<(String, String)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single `field = "value"` clause
    pub fn by(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and_eq(field, value)
    }

    /// Append an `AND field = "value"` clause
    #[must_use]
    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    pub fn parse(raw: &str) -> Result<Self, InventoryError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::new());
        }
        let mut filter = Self::new();
        for clause in raw.split(" AND ") {
            let (field, value) = clause.split_once('=').ok_or_else(|| {
                InventoryError::InvalidRequest(format!("invalid filter clause '{clause}'"))
            })?;
            let field = field.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .ok_or_else(|| {
                    InventoryError::InvalidRequest(format!("unquoted filter value in '{clause}'"))
                })?;
            if field.is_empty() {
                return Err(InventoryError::InvalidRequest(format!(
                    "missing field in filter clause '{clause}'"
                )));
            }
            filter = filter.and_eq(field, value.replace("\\\"", "\""));
        }
        Ok(filter)
    }

    /// Whether a serialized resource satisfies every clause
    #[must_use]
    pub fn matches(&self, resource: &Value) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            match lookup(resource, field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            }
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} = \"{}\"", field, value.replace('"', "\\\""))?;
        }
        Ok(())
    }
}
