//! Case-insensitive field-name sets.

use std::collections::HashSet;

/// A set of field names matched case-insensitively.
///
/// Excluded and sensitive field lists from the configuration are folded
/// into one of these before any document is walked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    names: HashSet<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from any iterable of names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn insert(&mut self, name: &str) {
        self.names.insert(name.to_ascii_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Union of two sets; used to merge global and per-entity field lists.
    pub fn union(&self, other: &FieldSet) -> FieldSet {
        FieldSet {
            names: self.names.union(&other.names).cloned().collect(),
        }
    }
}

impl<S: AsRef<str>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_names(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive() {
        let set = FieldSet::from_names(["Password", "ssn"]);
        assert!(set.contains("password"));
        assert!(set.contains("PASSWORD"));
        assert!(set.contains("SSN"));
        assert!(!set.contains("email"));
    }

    #[test]
    fn union_merges_both_sides() {
        let global = FieldSet::from_names(["password"]);
        let entity = FieldSet::from_names(["ssn", "PASSWORD"]);
        let merged = global.union(&entity);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains("ssn"));
        assert!(merged.contains("password"));
    }
}
