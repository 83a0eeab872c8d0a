//! Per-entity audit rules and primary-key specifications.

use crate::canonical_string;
use crate::model::Document;
use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Audit rule for one `(domain, entity)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRule {
    /// Domain name, the first dotted segment of the RPC package
    /// (e.g. "appointment").
    pub domain: String,

    /// Entity name (e.g. "Appointment").
    pub entity: String,

    #[serde(default)]
    pub enabled: bool,

    /// Operations to audit; anything not listed bypasses capture.
    #[serde(default)]
    pub operations: Vec<Operation>,

    #[serde(default)]
    pub primary_key: PrimaryKeySpec,

    #[serde(default)]
    pub excluded_fields: Vec<String>,

    #[serde(default)]
    pub sensitive_fields: Vec<String>,

    /// Override the global before-image setting; true always wins.
    #[serde(default)]
    pub include_before_data: bool,

    /// Override the global after-image setting; true always wins.
    #[serde(default)]
    pub include_after_data: bool,

    /// Field → transformer-name mapping, carried into the effective rule.
    #[serde(default)]
    pub transformers: HashMap<String, String>,

    /// Custom metadata copied onto every event for this entity.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EntityRule {
    pub fn allows(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// How to extract a primary key from a payload document.
///
/// Exactly one of `single_key` / `composite_keys` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKeySpec {
    #[serde(default)]
    pub single_key: Option<String>,

    /// Ordered component fields for a composite key.
    #[serde(default)]
    pub composite_keys: Vec<String>,

    /// Separator joining composite components.
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for PrimaryKeySpec {
    fn default() -> Self {
        Self {
            single_key: None,
            composite_keys: Vec::new(),
            separator: default_separator(),
        }
    }
}

impl PrimaryKeySpec {
    pub fn single(key: impl Into<String>) -> Self {
        Self {
            single_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn composite<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            composite_keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Render the primary key from a merged payload document.
    ///
    /// Returns `None` when the single key is absent or any composite
    /// component is missing or null; such events are dropped.
    pub fn resolve(&self, doc: &Document) -> Option<String> {
        if let Some(key) = &self.single_key {
            return match doc.get(key) {
                Some(value) if !value.is_null() => Some(canonical_string(value)),
                _ => None,
            };
        }

        if self.composite_keys.is_empty() {
            return None;
        }

        let mut parts = Vec::with_capacity(self.composite_keys.len());
        for key in &self.composite_keys {
            match doc.get(key) {
                Some(value) if !value.is_null() => parts.push(canonical_string(value)),
                _ => return None,
            }
        }
        Some(parts.join(&self.separator))
    }
}

fn default_separator() -> String {
    ":".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn single_key_resolution() {
        let spec = PrimaryKeySpec::single("id");
        let d = doc(json!({"id": "APT-1", "name": "x"}));
        assert_eq!(spec.resolve(&d), Some("APT-1".to_string()));

        let numeric = doc(json!({"id": 42}));
        assert_eq!(spec.resolve(&numeric), Some("42".to_string()));

        let missing = doc(json!({"name": "x"}));
        assert_eq!(spec.resolve(&missing), None);

        let null = doc(json!({"id": null}));
        assert_eq!(spec.resolve(&null), None);
    }

    #[test]
    fn composite_key_resolution() {
        let spec = PrimaryKeySpec::composite(["patient_no", "bu_code"]);
        let d = doc(json!({"patient_no": "P7", "bu_code": "BU1"}));
        assert_eq!(spec.resolve(&d), Some("P7:BU1".to_string()));

        // Any missing component drops the key entirely.
        let partial = doc(json!({"patient_no": "P7"}));
        assert_eq!(spec.resolve(&partial), None);
    }

    #[test]
    fn composite_custom_separator() {
        let spec = PrimaryKeySpec {
            separator: "/".to_string(),
            ..PrimaryKeySpec::composite(["a", "b"])
        };
        let d = doc(json!({"a": 1, "b": 2}));
        assert_eq!(spec.resolve(&d), Some("1/2".to_string()));
    }

    #[test]
    fn separator_defaults_from_yaml() {
        let spec: PrimaryKeySpec = serde_yaml::from_str("composite_keys: [a, b]").unwrap();
        assert_eq!(spec.separator, ":");
    }
}
