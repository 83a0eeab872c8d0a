//! Before/after document comparison.

use chronicle_core::{canonical_string, Document, FieldDiff, FieldSet, FieldType};
use serde_json::Value;
use std::collections::HashSet;

/// Computes field-level differences between two document trees.
///
/// Comparison is shallow: nested maps and lists are compared by their
/// canonical string form, not recursed into.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator {
    excluded: FieldSet,
    sensitive: FieldSet,
}

impl DiffCalculator {
    pub fn new(excluded: FieldSet, sensitive: FieldSet) -> Self {
        Self { excluded, sensitive }
    }

    /// Diff two optional documents into an ordered field-diff list.
    ///
    /// Keys present in `after` come first (additions and modifications),
    /// followed by keys only present in `before` (deletions). Excluded
    /// fields never appear. `diff(a, a)` is empty.
    pub fn calculate(&self, before: Option<&Document>, after: Option<&Document>) -> Vec<FieldDiff> {
        let mut diffs = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        if let Some(after) = after {
            for (key, new_value) in after {
                if self.excluded.contains(key) {
                    continue;
                }
                seen.insert(key.as_str());

                let old_value = before.and_then(|b| b.get(key));
                match old_value {
                    Some(old) if values_equal(old, new_value) => {}
                    _ => diffs.push(FieldDiff {
                        field_name: key.clone(),
                        field_type: FieldType::of(new_value),
                        old_value: old_value.cloned().unwrap_or(Value::Null),
                        new_value: new_value.clone(),
                        sanitized: false,
                    }),
                }
            }
        }

        if let Some(before) = before {
            for (key, old_value) in before {
                if self.excluded.contains(key) || seen.contains(key.as_str()) {
                    continue;
                }
                diffs.push(FieldDiff {
                    field_name: key.clone(),
                    field_type: FieldType::of(old_value),
                    old_value: old_value.clone(),
                    new_value: Value::Null,
                    sanitized: false,
                });
            }
        }

        diffs
    }

    /// Derive summary statistics from a diff list.
    pub fn stats(&self, diffs: &[FieldDiff]) -> DiffStats {
        let mut stats = DiffStats {
            total_fields: diffs.len(),
            ..DiffStats::default()
        };

        for diff in diffs {
            if self.sensitive.contains(&diff.field_name) {
                stats.sanitized_count += 1;
            }

            if diff.old_value.is_null() && !diff.new_value.is_null() {
                stats.added_fields += 1;
            } else if !diff.old_value.is_null() && diff.new_value.is_null() {
                stats.removed_fields += 1;
            } else {
                stats.changed_fields += 1;
            }
        }

        stats
    }
}

/// Equality by canonical string form; `null` equals `null`.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    canonical_string(a) == canonical_string(b)
}

/// Summary statistics over a diff list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub total_fields: usize,
    pub added_fields: usize,
    pub changed_fields: usize,
    pub removed_fields: usize,
    pub sanitized_count: usize,
}

impl DiffStats {
    /// Percentage of diffed fields that represent a change of any kind.
    pub fn change_percentage(&self) -> f64 {
        if self.total_fields == 0 {
            return 0.0;
        }
        (self.added_fields + self.changed_fields + self.removed_fields) as f64
            / self.total_fields as f64
            * 100.0
    }

    pub fn has_significant_changes(&self) -> bool {
        self.added_fields > 0 || self.changed_fields > 0 || self.removed_fields > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn calc() -> DiffCalculator {
        DiffCalculator::default()
    }

    #[test]
    fn diff_of_identical_documents_is_empty() {
        let d = doc(json!({"a": 1, "b": "x", "c": null, "d": [1, 2]}));
        assert!(calc().calculate(Some(&d), Some(&d)).is_empty());
    }

    #[test]
    fn detects_added_changed_and_removed() {
        let before = doc(json!({"name": "Alice", "status": "NEW", "gone": 1}));
        let after = doc(json!({"name": "Alice", "status": "DONE", "fresh": true}));
        let diffs = calc().calculate(Some(&before), Some(&after));

        assert_eq!(diffs.len(), 3);

        let status = diffs.iter().find(|d| d.field_name == "status").unwrap();
        assert_eq!(status.old_value, json!("NEW"));
        assert_eq!(status.new_value, json!("DONE"));
        assert_eq!(status.field_type, FieldType::String);

        let fresh = diffs.iter().find(|d| d.field_name == "fresh").unwrap();
        assert_eq!(fresh.old_value, json!(null));
        assert_eq!(fresh.field_type, FieldType::Boolean);

        let gone = diffs.iter().find(|d| d.field_name == "gone").unwrap();
        assert_eq!(gone.new_value, json!(null));
        assert_eq!(gone.field_type, FieldType::Integer);
    }

    #[test]
    fn missing_sides_are_whole_document_diffs() {
        let d = doc(json!({"a": 1, "b": 2}));

        let created = calc().calculate(None, Some(&d));
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|diff| diff.old_value.is_null()));

        let deleted = calc().calculate(Some(&d), None);
        assert_eq!(deleted.len(), 2);
        assert!(deleted.iter().all(|diff| diff.new_value.is_null()));

        assert!(calc().calculate(None, None).is_empty());
    }

    #[test]
    fn canonical_equality_bridges_numeric_strings() {
        let before = doc(json!({"id": "1"}));
        let after = doc(json!({"id": 1}));
        assert!(calc().calculate(Some(&before), Some(&after)).is_empty());
    }

    #[test]
    fn excluded_fields_never_diffed() {
        let before = doc(json!({"updated_at": "t1", "name": "a"}));
        let after = doc(json!({"updated_at": "t2", "name": "b"}));
        let calc = DiffCalculator::new(FieldSet::from_names(["updated_at"]), FieldSet::new());
        let diffs = calc.calculate(Some(&before), Some(&after));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field_name, "name");
    }

    #[test]
    fn diff_covers_all_non_excluded_keys() {
        let before = doc(json!({"a": 1, "b": 2, "skip": 0}));
        let after = doc(json!({"b": 3, "c": 4, "skip": 9}));
        let calc = DiffCalculator::new(FieldSet::from_names(["skip"]), FieldSet::new());
        let diffs = calc.calculate(Some(&before), Some(&after));

        let mut named: Vec<&str> = diffs.iter().map(|d| d.field_name.as_str()).collect();
        named.sort_unstable();
        assert_eq!(named, vec!["a", "b", "c"]);
    }

    #[test]
    fn stats_summarize_diffs() {
        let before = doc(json!({"name": "Alice", "status": "NEW", "gone": 1}));
        let after = doc(json!({"name": "Bob", "status": "NEW", "fresh": true}));
        let calc = DiffCalculator::new(FieldSet::new(), FieldSet::from_names(["name"]));
        let diffs = calc.calculate(Some(&before), Some(&after));
        let stats = calc.stats(&diffs);

        assert_eq!(stats.total_fields, 3);
        assert_eq!(stats.added_fields, 1);
        assert_eq!(stats.changed_fields, 1);
        assert_eq!(stats.removed_fields, 1);
        assert_eq!(stats.sanitized_count, 1);
        assert!(stats.has_significant_changes());
        assert!((stats.change_percentage() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats() {
        let stats = calc().stats(&[]);
        assert_eq!(stats.change_percentage(), 0.0);
        assert!(!stats.has_significant_changes());
    }
}
