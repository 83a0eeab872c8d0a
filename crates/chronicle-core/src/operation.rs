//! Operation categories and method-name inference.

use serde::{Deserialize, Serialize};

/// The inferred category of a mutating RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Patch,
    Reschedule,
    Void,
    Other,
}

impl Operation {
    /// Infer the operation from an RPC method name by substring match.
    ///
    /// Priority order: create/add/insert, delete/remove, void, patch,
    /// reschedule, update/modify/edit. Anything else is `Other`.
    pub fn infer(method_name: &str) -> Operation {
        let lower = method_name.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["create", "add", "insert"]) {
            Operation::Create
        } else if has(&["delete", "remove"]) {
            Operation::Delete
        } else if lower.contains("void") {
            Operation::Void
        } else if lower.contains("patch") {
            Operation::Patch
        } else if lower.contains("reschedule") {
            Operation::Reschedule
        } else if has(&["update", "modify", "edit"]) {
            Operation::Update
        } else {
            Operation::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Patch => "PATCH",
            Operation::Reschedule => "RESCHEDULE",
            Operation::Void => "VOID",
            Operation::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
