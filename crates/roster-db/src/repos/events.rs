//! Event log repository.
//!
//! Append-only records of domain events (contacts, status transitions,
//! email changes, notes, generic actions). Unlike change records there is
//! no diff and no suppression: every call appends one row.

use roster_core::audit_detail::{ContactDetail, EmailChangedDetail, StatusChangedDetail};
use roster_core::entities::EventRecord;
use roster_core::enums::EventLog;
use roster_core::ids::PREFIX_EVENT;
use serde_json::Value;

use crate::error::DatabaseError;
use crate::helpers::{
    event_log_to_table, format_datetime, get_opt_string, parse_datetime, parse_optional_json,
};
use crate::service::RosterService;

const SELECT_COLS: &str = "seq, id, subject_ids, action, message, payload, actor_id, created_at";

/// Filter criteria for event queries.
#[derive(Debug, Default)]
pub struct EventFilter {
    /// Events naming this id among their subjects.
    pub subject_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub limit: Option<u32>,
}

fn row_to_event(log: EventLog, row: &libsql::Row) -> Result<EventRecord, DatabaseError> {
    let subject_ids: Vec<String> = serde_json::from_str(&row.get::<String>(2)?)
        .map_err(|e| DatabaseError::Query(format!("Invalid subject ids: {e}")))?;
    Ok(EventRecord {
        seq: row.get::<i64>(0)?,
        id: row.get::<String>(1)?,
        log,
        subject_ids,
        action: row.get::<String>(3)?,
        message: row.get::<Option<String>>(4)?,
        payload: parse_optional_json(get_opt_string(row, 5)?.as_deref())?,
        actor_id: get_opt_string(row, 6)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

fn to_payload<T: serde::Serialize>(log: EventLog, detail: &T) -> Result<Value, DatabaseError> {
    serde_json::to_value(detail).map_err(|e| DatabaseError::AuditWrite {
        table: event_log_to_table(log).to_string(),
        reason: e.to_string(),
    })
}

impl RosterService {
    /// Append one event to `log`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::AuditWrite` if the event cannot be persisted.
    pub async fn record_event(
        &self,
        log: EventLog,
        subject_ids: &[&str],
        action: &str,
        message: Option<&str>,
        payload: Option<Value>,
        actor_id: Option<&str>,
    ) -> Result<EventRecord, DatabaseError> {
        let table = event_log_to_table(log);
        let audit_err = |reason: String| DatabaseError::AuditWrite {
            table: table.to_string(),
            reason,
        };

        let id = self
            .db()
            .generate_id(PREFIX_EVENT)
            .await
            .map_err(|e| audit_err(e.to_string()))?;
        let subjects_json =
            serde_json::to_string(subject_ids).map_err(|e| audit_err(e.to_string()))?;
        let created_at = chrono::Utc::now();

        self.db()
            .conn()
            .execute(
                &format!(
                    "INSERT INTO {table} (id, subject_ids, action, message, payload, actor_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                libsql::params![
                    id.as_str(),
                    subjects_json,
                    action,
                    message,
                    payload.as_ref().map(ToString::to_string),
                    actor_id,
                    format_datetime(created_at)
                ],
            )
            .await
            .map_err(|e| audit_err(e.to_string()))?;
        let seq = self.db().conn().last_insert_rowid();

        tracing::debug!(log = %log, action, subjects = subject_ids.len(), "event recorded");

        Ok(EventRecord {
            id,
            seq,
            log,
            subject_ids: subject_ids.iter().map(|s| (*s).to_string()).collect(),
            action: action.to_string(),
            message: message.map(str::to_string),
            payload,
            actor_id: actor_id.map(str::to_string),
            created_at,
        })
    }

    /// Record a status transition of one record.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_event`].
    pub async fn record_status_change(
        &self,
        subject_id: &str,
        detail: &StatusChangedDetail,
        actor_id: Option<&str>,
    ) -> Result<EventRecord, DatabaseError> {
        let payload = to_payload(EventLog::Status, detail)?;
        self.record_event(
            EventLog::Status,
            &[subject_id],
            "status_changed",
            detail.reason.as_deref(),
            Some(payload),
            actor_id,
        )
        .await
    }

    /// Record an email address change for one person.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_event`].
    pub async fn record_email_change(
        &self,
        person_id: &str,
        detail: &EmailChangedDetail,
        actor_id: Option<&str>,
    ) -> Result<EventRecord, DatabaseError> {
        let payload = to_payload(EventLog::Email, detail)?;
        self.record_event(
            EventLog::Email,
            &[person_id],
            "email_changed",
            None,
            Some(payload),
            actor_id,
        )
        .await
    }

    /// Record contact from one person to another.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_event`].
    pub async fn record_contact(
        &self,
        from_person_id: &str,
        to_person_id: &str,
        detail: &ContactDetail,
        message: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<EventRecord, DatabaseError> {
        let payload = to_payload(EventLog::Contact, detail)?;
        self.record_event(
            EventLog::Contact,
            &[from_person_id, to_person_id],
            "contacted",
            message,
            Some(payload),
            actor_id,
        )
        .await
    }

    /// Attach a free-text note to a person.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_event`].
    pub async fn record_note(
        &self,
        person_id: &str,
        note: &str,
        actor_id: Option<&str>,
    ) -> Result<EventRecord, DatabaseError> {
        self.record_event(EventLog::Note, &[person_id], "note", Some(note), None, actor_id)
            .await
    }

    /// Query one event log with optional filters, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query_events(
        &self,
        log: EventLog,
        filter: &EventFilter,
    ) -> Result<Vec<EventRecord>, DatabaseError> {
        let table = event_log_to_table(log);
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref subject) = filter.subject_id {
            params.push(libsql::Value::Text(subject.clone()));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each({table}.subject_ids) WHERE json_each.value = ?{})",
                params.len()
            ));
        }
        if let Some(ref action) = filter.action {
            params.push(libsql::Value::Text(action.clone()));
            conditions.push(format!("action = ?{}", params.len()));
        }
        if let Some(ref actor) = filter.actor_id {
            params.push(libsql::Value::Text(actor.clone()));
            conditions.push(format!("actor_id = ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "SELECT {SELECT_COLS} FROM {table} {where_clause} ORDER BY seq ASC LIMIT {limit}"
        );

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(row_to_event(log, &row)?);
        }
        Ok(events)
    }
}
