//! Operation kinds, event logs, and field kinds for Roster.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`,
//! and expose `as_str()` returning the exact value stored in SQL.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ChangeOperation
// ---------------------------------------------------------------------------

/// Kind of mutation captured by a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Modify,
    Delete,
}

impl ChangeOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only event log an event record belongs to.
///
/// Each log is stored in its own table; the event itself is the fact, there
/// is no field-level diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventLog {
    /// Contact between two people (messages, calls, in-person).
    Contact,
    /// Status transitions of a person or record.
    Status,
    /// Email address changes.
    Email,
    /// Free-text notes about a person.
    Note,
    /// Anything else worth a line in the history.
    Action,
}

impl EventLog {
    pub const ALL: [Self; 5] = [
        Self::Contact,
        Self::Status,
        Self::Email,
        Self::Note,
        Self::Action,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Status => "status",
            Self::Email => "email",
            Self::Note => "note",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// Storage type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Boolean,
    /// RFC 3339 timestamp carried as a JSON string.
    Timestamp,
    /// Arbitrary JSON, stored as TEXT.
    Json,
}

impl FieldKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }

    /// SQL column type used when the entity table is created.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp | Self::Json => "TEXT",
        }
    }

    /// Whether a JSON value has the right shape for this kind.
    ///
    /// `null` is accepted by every kind; presence is the job of `FieldRule::Required`.
    #[must_use]
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (_, Value::Null) | (Self::Json, _) => true,
            (Self::Text, Value::String(_)) | (Self::Boolean, Value::Bool(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64(),
            (Self::Real, Value::Number(_)) => true,
            (Self::Timestamp, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            _ => false,
        }
    }

    /// Canonical JSON form of a value of this kind.
    ///
    /// `Real` numbers become floats so `2` and `2.0` compare equal in diffs.
    /// Everything else passes through untouched.
    #[must_use]
    pub fn normalize(self, value: serde_json::Value) -> serde_json::Value {
        use serde_json::{Number, Value};
        match (self, value) {
            (Self::Real, Value::Number(n)) => match n.as_f64().and_then(Number::from_f64) {
                Some(float) => Value::Number(float),
                None => Value::Number(n),
            },
            (_, other) => other,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
