//! The persisted audit event model and read-side query types.
//!
//! Field names follow the stored document schema: `change_data` holds the
//! before-image, `after_data` the after-image, and `primary_key_str` is the
//! keyword the read side filters on.

use crate::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A string-keyed document tree, the shape every RPC payload is reduced to.
pub type Document = serde_json::Map<String, Value>;

/// One audit record describing a single mutating RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Opaque unique ID, unique across all index partitions.
    pub id: String,

    /// Lowercase domain the RPC belongs to (e.g. "appointment").
    pub domain: String,

    /// Entity name derived from the domain (e.g. "Appointment").
    pub entity: String,

    /// Inferred operation category.
    pub operation: Operation,

    /// Structured primary key.
    #[serde(default)]
    pub primary_key: Document,

    /// Primary key rendered as a single string; never empty for a stored
    /// event (empty-key events are dropped before they reach the store).
    pub primary_key_str: String,

    /// State before the mutation. Empty for CREATE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_data: Option<Document>,

    /// State after the mutation. Empty for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_data: Option<Document>,

    /// Field-level diffs between the two sides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldDiff>,

    /// Actor ID extracted from the call context.
    #[serde(default)]
    pub changed_by: String,

    /// Actor email extracted from the call context.
    #[serde(default)]
    pub changed_by_email: String,

    /// UTC timestamp assigned at interception.
    pub change_timestamp: DateTime<Utc>,

    /// Opaque request ID, also attached to the call context.
    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub ip_address: String,

    #[serde(default)]
    pub user_agent: String,

    /// Additional metadata (`method`, `duration_ms`, plus any per-entity
    /// entries from the configuration).
    #[serde(default)]
    pub metadata: Document,
}

impl ChangeEvent {
    /// Create a new event with a fresh ID and the current UTC timestamp.
    pub fn new(
        domain: impl Into<String>,
        entity: impl Into<String>,
        operation: Operation,
        primary_key_str: impl Into<String>,
    ) -> Self {
        let primary_key_str = primary_key_str.into();
        Self {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            entity: entity.into(),
            operation,
            primary_key: parse_primary_key(&primary_key_str),
            primary_key_str,
            change_data: None,
            after_data: None,
            changes: Vec::new(),
            changed_by: String::new(),
            changed_by_email: String::new(),
            change_timestamp: Utc::now(),
            request_id: String::new(),
            ip_address: String::new(),
            user_agent: String::new(),
            metadata: Document::new(),
        }
    }

    /// Create a builder for an event.
    pub fn builder(
        domain: impl Into<String>,
        entity: impl Into<String>,
        operation: Operation,
        primary_key_str: impl Into<String>,
    ) -> ChangeEventBuilder {
        ChangeEventBuilder {
            event: ChangeEvent::new(domain, entity, operation, primary_key_str),
        }
    }
}

/// Builder for change events.
#[derive(Debug)]
pub struct ChangeEventBuilder {
    event: ChangeEvent,
}

impl ChangeEventBuilder {
    /// Set the before-image.
    pub fn change_data(mut self, data: Option<Document>) -> Self {
        self.event.change_data = data;
        self
    }

    /// Set the after-image.
    pub fn after_data(mut self, data: Option<Document>) -> Self {
        self.event.after_data = data;
        self
    }

    /// Set the field-level diffs.
    pub fn changes(mut self, changes: Vec<FieldDiff>) -> Self {
        self.event.changes = changes;
        self
    }

    /// Set the actor identity.
    pub fn changed_by(mut self, id: impl Into<String>, email: impl Into<String>) -> Self {
        self.event.changed_by = id.into();
        self.event.changed_by_email = email.into();
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.event.request_id = request_id.into();
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.event.ip_address = ip.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.event.user_agent = ua.into();
        self
    }

    pub fn metadata(mut self, metadata: Document) -> Self {
        self.event.metadata = metadata;
        self
    }

    /// Override the assigned timestamp; tests use this to backdate events.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.event.change_timestamp = ts;
        self
    }

    pub fn build(self) -> ChangeEvent {
        self.event
    }
}

/// Convert a rendered primary key back to a structured map.
fn parse_primary_key(pk: &str) -> Document {
    let mut map = Document::new();
    if !pk.is_empty() {
        map.insert("value".to_string(), Value::String(pk.to_string()));
    }
    map
}

/// One before/after value pair for a named leaf field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field_name: String,
    pub field_type: FieldType,
    pub old_value: Value,
    pub new_value: Value,
    /// True when the values are the masked forms, not the originals.
    pub sanitized: bool,
}

/// JSON-level type of a diffed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Other,
}

impl FieldType {
    /// Detect the type of a JSON value. Floats with an integral value are
    /// reported as integers, matching how numeric payloads round-trip
    /// through generic JSON decoding.
    pub fn of(value: &Value) -> FieldType {
        match value {
            Value::Null => FieldType::Null,
            Value::Bool(_) => FieldType::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    FieldType::Integer
                } else if n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.is_finite()) {
                    FieldType::Integer
                } else {
                    FieldType::Number
                }
            }
            Value::String(_) => FieldType::String,
            Value::Array(_) => FieldType::Array,
            Value::Object(_) => FieldType::Object,
        }
    }
}

/// Filter for read-side queries.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub domain: Option<String>,
    pub entity: Option<String>,
    pub primary_key_str: Option<String>,
    pub operation: Option<Operation>,
    pub changed_by: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of records; 0 means the store default (100).
    pub limit: usize,
    pub offset: usize,
}

/// Query results with paging metadata. Records are ordered by
/// `change_timestamp` descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    pub records: Vec<ChangeEvent>,
}

/// The full change history of one entity instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    pub domain: String,
    pub entity: String,
    pub primary_key_str: String,
    pub change_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_change: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<DateTime<Utc>>,
    /// Distinct actors who changed this entity.
    pub changed_by: Vec<String>,
    /// Count of each operation type.
    pub operations: BTreeMap<Operation, u64>,
    pub changes: Vec<ChangeEvent>,
}

/// A closed date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregate statistics over stored events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub domain: String,
    pub entity: String,
    pub total_records: u64,
    pub date_range: DateRange,
    pub operation_counts: BTreeMap<Operation, u64>,
    pub unique_actors: u64,
    pub unique_keys: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_populates_event() {
        let event = ChangeEvent::builder("appointment", "Appointment", Operation::Create, "APT-1")
            .changed_by("u1", "u1@example.com")
            .request_id("req-1")
            .ip_address("10.0.0.1")
            .build();

        assert!(!event.id.is_empty());
        assert_eq!(event.domain, "appointment");
        assert_eq!(event.operation, Operation::Create);
        assert_eq!(event.primary_key_str, "APT-1");
        assert_eq!(event.primary_key.get("value"), Some(&json!("APT-1")));
        assert_eq!(event.changed_by, "u1");
        assert_eq!(event.ip_address, "10.0.0.1");
    }

    #[test]
    fn serializes_with_stored_field_names() {
        let event = ChangeEvent::new("patient", "Patient", Operation::Delete, "P7:BU1");
        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "id",
            "domain",
            "entity",
            "operation",
            "primary_key",
            "primary_key_str",
            "changed_by",
            "changed_by_email",
            "change_timestamp",
            "request_id",
            "ip_address",
            "user_agent",
            "metadata",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj["operation"], json!("DELETE"));
        // Empty sides and empty diff lists are omitted from the document.
        assert!(!obj.contains_key("change_data"));
        assert!(!obj.contains_key("after_data"));
        assert!(!obj.contains_key("changes"));
    }

    #[test]
    fn field_type_detection() {
        assert_eq!(FieldType::of(&json!(null)), FieldType::Null);
        assert_eq!(FieldType::of(&json!(true)), FieldType::Boolean);
        assert_eq!(FieldType::of(&json!(3)), FieldType::Integer);
        assert_eq!(FieldType::of(&json!(3.0)), FieldType::Integer);
        assert_eq!(FieldType::of(&json!(3.5)), FieldType::Number);
        assert_eq!(FieldType::of(&json!("x")), FieldType::String);
        assert_eq!(FieldType::of(&json!([1])), FieldType::Array);
        assert_eq!(FieldType::of(&json!({"a": 1})), FieldType::Object);
    }
}
