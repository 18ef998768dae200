//! Field masks for partial updates
//!
//! A mask is a list of (possibly dotted) field paths. Only the masked fields of the
//! resource sent with an update are written by the inventory.

use crate::error::InventoryError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMask {
    paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Reject empty masks and empty path segments
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.paths.is_empty() {
            return Err(InventoryError::InvalidRequest("empty field mask".to_string()));
        }
        if let Some(bad) = self
            .paths
            .iter()
            .find(|p| p.is_empty() || p.split('.').any(str::is_empty))
        {
            return Err(InventoryError::InvalidRequest(format!(
                "invalid field mask path '{bad}'"
            )));
        }
        Ok(())
    }

    /// Keep only the masked fields of `value`; missing fields project to `null`
    #[must_use]
    pub fn project(&self, value: &Value) -> Value {
        let mut out = Value::Object(Map::new());
        for path in &self.paths {
            let field = lookup(value, path).cloned().unwrap_or(Value::Null);
            set_path(&mut out, path, field);
        }
        out
    }

    /// Copy the masked fields of `source` into `target`
    pub fn merge(&self, target: &mut Value, source: &Value) {
        for path in &self.paths {
            let field = lookup(source, path).cloned().unwrap_or(Value::Null);
            set_path(target, path, field);
        }
    }

    /// Whether `a` and `b` agree on every masked field
    pub fn is_same_under_mask<T: Serialize>(&self, a: &T, b: &T) -> Result<bool, InventoryError> {
        let a = serde_json::to_value(a)?;
        let b = serde_json::to_value(b)?;
        Ok(self.project(&a) == self.project(&b))
    }
}

/// Resolve a dotted path inside a JSON value
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn set_path(target: &mut Value, path: &str, field: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), field);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HostState, OperatingSystem};
    use serde_json::json;

    #[test]
    fn test_same_under_mask_ignores_other_fields() {
        let mask = FieldMask::new(["repo_url"]);
        let a = OperatingSystem {
            name: "ubuntu".to_string(),
            repo_url: "a;b".to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.name = "other".to_string();
        assert!(mask.is_same_under_mask(&a, &b).unwrap());

        b.repo_url = "a;c".to_string();
        assert!(!mask.is_same_under_mask(&a, &b).unwrap());
    }

    #[test]
    fn test_merge_dotted_path() {
        let mask = FieldMask::new(["current_state", "nic.resource_id"]);
        let mut target = json!({"current_state": "ONBOARDED", "name": "h1"});
        let source = json!({"current_state": HostState::Deleted, "nic": {"resource_id": "hostnic-1"}});
        mask.merge(&mut target, &source);
        assert_eq!(target["current_state"], "DELETED");
        assert_eq!(target["nic"]["resource_id"], "hostnic-1");
        assert_eq!(target["name"], "h1");
    }

    #[test]
    fn test_validate() {
        assert!(FieldMask::default().validate().is_err());
        assert!(FieldMask::new(["a..b"]).validate().is_err());
        assert!(FieldMask::new(["host_status", "host_status_indicator"]).validate().is_ok());
    }
}
