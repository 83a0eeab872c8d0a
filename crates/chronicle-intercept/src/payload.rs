//! RPC payload to document-tree conversion.

use chronicle_core::Document;
use serde::Serialize;
use serde_json::Value;

/// Convert an RPC payload into a string-keyed document tree.
///
/// Any serializable message works; structured messages keep their original
/// (snake_case) field names through their serde representation. Returns
/// `None` when the payload fails to serialize or is not an object, in
/// which case the call is treated as carrying an empty payload.
pub fn to_document<T: Serialize>(payload: &T) -> Option<Document> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(_) => None,
    }
}

/// Flatten a PATCH-style request for diffing.
///
/// Requests that carry a `data` array of `{field, value}` pairs are
/// normalized into top-level `field -> value` entries. All other top-level
/// fields are preserved; on a name clash the array item wins.
pub fn normalize_patch(doc: &Document) -> Document {
    let mut out = Document::new();

    for (key, value) in doc {
        if key != "data" {
            out.insert(key.clone(), value.clone());
        }
    }

    let Some(Value::Array(items)) = doc.get("data") else {
        return out;
    };

    for item in items {
        let Some(entry) = item.as_object() else { continue };
        let (Some(Value::String(field)), Some(value)) = (entry.get("field"), entry.get("value"))
        else {
            continue;
        };
        out.insert(field.clone(), value.clone());
    }

    out
}

/// Merge two optional documents; entries from `overlay` win.
pub fn merge(base: Option<&Document>, overlay: Option<&Document>) -> Document {
    let mut out = base.cloned().unwrap_or_default();
    if let Some(overlay) = overlay {
        for (key, value) in overlay {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn structs_become_documents() {
        #[derive(Serialize)]
        struct AddAppointmentRequest {
            id: String,
            visit_count: u32,
        }

        let out = to_document(&AddAppointmentRequest {
            id: "APT-1".to_string(),
            visit_count: 2,
        })
        .unwrap();
        assert_eq!(out["id"], json!("APT-1"));
        assert_eq!(out["visit_count"], json!(2));
    }

    #[test]
    fn non_objects_are_unmappable() {
        assert!(to_document(&42).is_none());
        assert!(to_document(&"scalar").is_none());
        assert!(to_document(&vec![1, 2, 3]).is_none());
    }

    #[test]
    fn patch_data_array_is_flattened() {
        let input = doc(json!({
            "id": "APT-1",
            "data": [
                {"field": "status", "value": "CONFIRMED"},
                {"field": "slot", "value": 3},
            ],
        }));
        let out = normalize_patch(&input);

        assert_eq!(out["id"], json!("APT-1"));
        assert_eq!(out["status"], json!("CONFIRMED"));
        assert_eq!(out["slot"], json!(3));
        assert!(!out.contains_key("data"));
    }

    #[test]
    fn patch_array_items_win_over_top_level() {
        let input = doc(json!({
            "status": "OLD",
            "data": [{"field": "status", "value": "NEW"}],
        }));
        let out = normalize_patch(&input);
        assert_eq!(out["status"], json!("NEW"));
    }

    #[test]
    fn malformed_patch_entries_are_skipped() {
        let input = doc(json!({
            "data": [
                "not a map",
                {"field": "ok", "value": 1},
                {"value": "no field"},
                {"field": 7, "value": "field not a string"},
            ],
        }));
        let out = normalize_patch(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out["ok"], json!(1));
    }

    #[test]
    fn patch_without_data_is_passthrough() {
        let input = doc(json!({"id": "x", "data": "scalar"}));
        let out = normalize_patch(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out["id"], json!("x"));
    }

    #[test]
    fn merge_prefers_overlay() {
        let base = doc(json!({"id": "req", "a": 1}));
        let overlay = doc(json!({"id": "resp", "b": 2}));
        let merged = merge(Some(&base), Some(&overlay));
        assert_eq!(merged["id"], json!("resp"));
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(2));

        assert!(merge(None, None).is_empty());
        assert_eq!(merge(None, Some(&overlay))["id"], json!("resp"));
    }
}
