//! Field-level redaction of document trees.

use chronicle_core::{Document, FieldDiff, FieldSet};
use serde_json::Value;

/// Drops excluded fields and masks sensitive values.
///
/// Field-name matching is case-insensitive at every depth. The sanitizer
/// never mutates its input; it returns a new tree.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    mask_char: char,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self { mask_char: '*' }
    }

    /// Sanitize a document tree.
    ///
    /// Excluded fields are dropped from the output entirely. Sensitive
    /// fields are masked with [`Sanitizer::mask_value`]. Non-sensitive
    /// nested maps and lists are recursed with the same rule sets.
    pub fn sanitize_document(
        &self,
        doc: &Document,
        excluded: &FieldSet,
        sensitive: &FieldSet,
    ) -> Document {
        let mut out = Document::new();

        for (key, value) in doc {
            if excluded.contains(key) {
                continue;
            }

            if sensitive.contains(key) {
                out.insert(key.clone(), self.mask_value(value));
                continue;
            }

            let sanitized = match value {
                Value::Object(map) => {
                    Value::Object(self.sanitize_document(map, excluded, sensitive))
                }
                Value::Array(items) => {
                    Value::Array(self.sanitize_list(items, excluded, sensitive))
                }
                other => other.clone(),
            };
            out.insert(key.clone(), sanitized);
        }

        out
    }

    fn sanitize_list(&self, items: &[Value], excluded: &FieldSet, sensitive: &FieldSet) -> Vec<Value> {
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => {
                    Value::Object(self.sanitize_document(map, excluded, sensitive))
                }
                Value::Array(nested) => {
                    Value::Array(self.sanitize_list(nested, excluded, sensitive))
                }
                other => other.clone(),
            })
            .collect()
    }

    /// Mask one sensitive value. Strings are partially masked; null stays
    /// null; everything else is replaced with the literal `"****"`.
    pub fn mask_value(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(self.mask_string(s)),
            _ => Value::String("****".to_string()),
        }
    }

    /// Partially mask a string.
    ///
    /// Values of four characters or fewer are fully masked. Longer values
    /// keep `max(2, ceil(n * 0.2))` visible characters, split as a
    /// `visible / 2` prefix with the remainder as suffix.
    pub fn mask_string(&self, value: &str) -> String {
        let n = value.chars().count();
        if n == 0 {
            return String::new();
        }
        if n <= 4 {
            return self.mask_char.to_string().repeat(n);
        }

        let visible = (((n as f64) * 0.2).ceil() as usize).max(2);
        let prefix_len = visible / 2;
        let suffix_len = visible - prefix_len;

        let prefix: String = value.chars().take(prefix_len).collect();
        let suffix: String = value.chars().skip(n - suffix_len).collect();
        let middle = self.mask_char.to_string().repeat(n - visible);

        format!("{prefix}{middle}{suffix}")
    }

    /// Mask the values of diffs whose field is sensitive and flag them.
    pub fn sanitize_diffs(&self, diffs: Vec<FieldDiff>, sensitive: &FieldSet) -> Vec<FieldDiff> {
        diffs
            .into_iter()
            .map(|mut diff| {
                if sensitive.contains(&diff.field_name) {
                    diff.old_value = self.mask_value(&diff.old_value);
                    diff.new_value = self.mask_value(&diff.new_value);
                    diff.sanitized = true;
                }
                diff
            })
            .collect()
    }

    /// Mask an email address, keeping the first two characters of the
    /// local part and the full domain.
    pub fn mask_email(&self, email: &str) -> String {
        match email.split_once('@') {
            Some((local, domain)) if local.chars().count() >= 2 => {
                let prefix: String = local.chars().take(2).collect();
                format!("{prefix}****@{domain}")
            }
            _ => email.to_string(),
        }
    }

    /// Mask a phone number, keeping the first three and last two digits.
    pub fn mask_phone(&self, phone: &str) -> String {
        let n = phone.chars().count();
        if n <= 5 {
            return self.mask_char.to_string().repeat(n);
        }
        let prefix: String = phone.chars().take(3).collect();
        let suffix: String = phone.chars().skip(n - 2).collect();
        format!("{prefix}{}{suffix}", self.mask_char.to_string().repeat(n - 5))
    }

    /// Mask a social security number, keeping the last four digits.
    pub fn mask_ssn(&self, ssn: &str) -> String {
        let clean: String = ssn.chars().filter(|c| *c != '-' && *c != ' ').collect();
        let n = clean.chars().count();
        if n <= 4 {
            return self.mask_char.to_string().repeat(n);
        }
        let suffix: String = clean.chars().skip(n - 4).collect();
        format!("{}{suffix}", self.mask_char.to_string().repeat(n - 4))
    }
}

/// Field-name heuristics used by the auto-detect helper. Not consulted
/// during normal interception.
pub fn looks_like_email(field_name: &str) -> bool {
    let lower = field_name.to_ascii_lowercase();
    lower.contains("email") || lower.contains("mail") || lower.contains("address")
}

pub fn looks_like_phone(field_name: &str) -> bool {
    let lower = field_name.to_ascii_lowercase();
    lower.contains("phone") || lower.contains("mobile") || lower.contains("telephone") || lower.contains("tel")
}

pub fn looks_like_ssn(field_name: &str) -> bool {
    let lower = field_name.to_ascii_lowercase();
    lower.contains("ssn") || lower.contains("social") || lower.contains("security")
}

pub fn looks_like_password(field_name: &str) -> bool {
    let lower = field_name.to_ascii_lowercase();
    lower.contains("password") || lower.contains("passwd") || lower.contains("pwd") || lower.contains("secret")
}

/// Pick out field names that look sensitive by name alone.
pub fn auto_detect_sensitive_fields<'a, I>(field_names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    field_names
        .into_iter()
        .filter(|name| {
            looks_like_email(name)
                || looks_like_phone(name)
                || looks_like_ssn(name)
                || looks_like_password(name)
        })
        .map(str::to_string)
        .collect()
}
