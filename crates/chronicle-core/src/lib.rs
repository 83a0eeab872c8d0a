//! # chronicle-core
//!
//! Shared types for the Chronicle audit pipeline.
//!
//! This crate provides:
//! - The audit configuration model loaded from YAML (`config`), including
//!   per-entity rules, primary-key specs, and index-name templating
//! - The persisted event model (`ChangeEvent`, `FieldDiff`) and the
//!   read-side query types (`QueryFilter`, `EntityHistory`, `AuditStats`)
//! - The `Operation` enum with method-name inference
//! - `FieldSet`, the case-insensitive field-name set shared by the
//!   sanitizer, diff calculator, and config resolver

pub mod config;
pub mod error;
pub mod fieldset;
pub mod model;
pub mod operation;

pub use config::{ChronicleConfig, EffectiveRule, EntityRule, GlobalConfig, PrimaryKeySpec, StoreConfig};
pub use error::ConfigError;
pub use fieldset::FieldSet;
pub use model::{
    AuditStats, ChangeEvent, ChangeEventBuilder, DateRange, Document, EntityHistory, FieldDiff,
    FieldType, QueryFilter, QueryResult,
};
pub use operation::Operation;

/// Canonical string form of a JSON value, used for equality checks and
/// primary-key rendering. Strings compare by their contents (no JSON
/// quoting), so the string `"1"` and the number `1` render identically.
pub fn canonical_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Uppercase the first letter of a domain name to form its entity name.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_string_unquotes_strings() {
        assert_eq!(canonical_string(&json!("APT-1")), "APT-1");
        assert_eq!(canonical_string(&json!(1)), "1");
        assert_eq!(canonical_string(&json!("1")), canonical_string(&json!(1)));
        assert_eq!(canonical_string(&json!(null)), "null");
        assert_eq!(canonical_string(&json!(true)), "true");
    }

    #[test]
    fn capitalize_first_letter() {
        assert_eq!(capitalize("appointment"), "Appointment");
        assert_eq!(capitalize("p"), "P");
        assert_eq!(capitalize(""), "");
    }
}
