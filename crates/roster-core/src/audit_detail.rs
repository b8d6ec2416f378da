//! Typed event payloads.
//!
//! Event records carry a free-form `payload` JSON blob. These types give the
//! common payload shapes a schema, so producers and readers agree on them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Payload for `EventLog::Status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StatusChangedDetail {
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
}

/// Payload for `EventLog::Email`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EmailChangedDetail {
    pub old_email: Option<String>,
    pub new_email: String,
}

/// Payload for `EventLog::Contact`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ContactDetail {
    /// How contact happened, e.g. `email`, `phone`, `in_person`.
    pub method: String,
    pub subject: Option<String>,
}
