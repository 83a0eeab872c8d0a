//! # chronicle-redact
//!
//! The pure layers of the Chronicle audit pipeline:
//!
//! - [`Sanitizer`] drops excluded fields and masks sensitive values in
//!   document trees, recursively
//! - [`DiffCalculator`] compares before/after documents into a field-diff
//!   list, with [`DiffStats`] as a derived summary
//!
//! Both operate on plain JSON document trees and never touch I/O.

pub mod diff;
pub mod sanitizer;

pub use diff::{DiffCalculator, DiffStats};
pub use sanitizer::{auto_detect_sensitive_fields, Sanitizer};
