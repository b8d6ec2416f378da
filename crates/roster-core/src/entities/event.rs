use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::EventLog;

/// An append-only fact: something happened to or between the subjects.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EventRecord {
    pub id: String,
    /// Insertion order within its log.
    pub seq: i64,
    pub log: EventLog,
    /// Person/entity ids the event is about, in caller order.
    pub subject_ids: Vec<String>,
    pub action: String,
    pub message: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// `None` for automated (bot) events.
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
