//! Cross-cutting error types for Roster.
//!
//! Storage errors (`DatabaseError`) live in `roster-db`; this module holds the
//! errors that schema descriptors and field validation raise on their own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field that failed one of its declared rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    /// Rule name, e.g. `required`, `max_length`, `unknown_field`.
    pub rule: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Field-level validation failure. Carries every violation found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed for {kind}: {}", summarize(.violations))]
pub struct ValidationError {
    pub kind: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Whether `field` failed `rule`.
    #[must_use]
    pub fn has(&self, field: &str, rule: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.field == field && v.rule == rule)
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.field, v.rule))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors in a schema definition itself (not in the data it describes).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Table, kind, or field name is not a plain lowercase SQL identifier.
    #[error("Invalid identifier '{0}': expected [a-z][a-z0-9_]*")]
    InvalidIdentifier(String),

    #[error("Field '{field}' declared twice in {kind}")]
    DuplicateField { kind: String, field: String },

    /// A field name collides with a column the store manages itself.
    #[error("Field '{field}' in {kind} is reserved")]
    ReservedField { kind: String, field: String },

    #[error("Natural key '{field}' of {kind} must be a unique field")]
    NaturalKeyNotUnique { kind: String, field: String },

    #[error("Unknown field '{field}' referenced by {kind}")]
    UnknownField { kind: String, field: String },

    #[error("Entity kind '{0}' is already registered")]
    DuplicateKind(String),
}
