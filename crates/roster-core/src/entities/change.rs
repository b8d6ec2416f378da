use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::diff::FieldDiff;
use crate::enums::ChangeOperation;

/// An append-only change record: who changed which fields of which row, and when.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ChangeRecord {
    pub id: String,
    /// Insertion order within the change log.
    pub seq: i64,
    pub table_name: String,
    pub record_id: String,
    pub operation: ChangeOperation,
    pub changes: FieldDiff,
    /// `None` for automated changes.
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
