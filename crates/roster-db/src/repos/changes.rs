//! Change audit repository.
//!
//! Append-only change records holding the field-level diff of one entity
//! write. Rows are read back in insertion order (`seq`), which is also the
//! order needed to replay a record's history.

use std::collections::BTreeSet;

use roster_core::diff::FieldDiff;
use roster_core::entities::{ChangeRecord, Fields};
use roster_core::enums::ChangeOperation;
use roster_core::ids::PREFIX_CHANGE;

use crate::error::DatabaseError;
use crate::helpers::{format_datetime, get_opt_string, parse_datetime, parse_enum};
use crate::service::RosterService;

const CHANGE_TABLE: &str = "change_log";

const SELECT_COLS: &str = "seq, id, table_name, record_id, operation, changes, actor_id, created_at";

/// Filter criteria for change queries.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub operation: Option<ChangeOperation>,
    pub actor_id: Option<String>,
    pub limit: Option<u32>,
}

impl ChangeFilter {
    /// Every change to one record.
    #[must_use]
    pub fn for_record(table_name: &str, record_id: &str) -> Self {
        Self {
            table_name: Some(table_name.to_string()),
            record_id: Some(record_id.to_string()),
            ..Self::default()
        }
    }
}

fn row_to_change(row: &libsql::Row) -> Result<ChangeRecord, DatabaseError> {
    let changes: FieldDiff = serde_json::from_str(&row.get::<String>(5)?)
        .map_err(|e| DatabaseError::Query(format!("Invalid change diff: {e}")))?;
    Ok(ChangeRecord {
        seq: row.get::<i64>(0)?,
        id: row.get::<String>(1)?,
        table_name: row.get::<String>(2)?,
        record_id: row.get::<String>(3)?,
        operation: parse_enum(&row.get::<String>(4)?)?,
        changes,
        actor_id: get_opt_string(row, 6)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

impl RosterService {
    /// Append a change record for one entity write.
    ///
    /// Globally excluded fields are removed first. Returns `Ok(None)` without
    /// writing when the remaining diff is empty or auditing is disabled.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::AuditWrite` if the record cannot be persisted.
    pub async fn record_change(
        &self,
        table_name: &str,
        record_id: &str,
        operation: ChangeOperation,
        changes: FieldDiff,
        actor_id: Option<&str>,
    ) -> Result<Option<ChangeRecord>, DatabaseError> {
        if !self.audit_config().enabled {
            return Ok(None);
        }

        let excluded: BTreeSet<String> =
            self.audit_config().excluded_fields.iter().cloned().collect();
        let changes = changes.without(&excluded);
        if changes.is_empty() {
            tracing::debug!(table = table_name, id = record_id, %operation, "empty diff, no change record");
            return Ok(None);
        }

        let audit_err = |reason: String| DatabaseError::AuditWrite {
            table: CHANGE_TABLE.to_string(),
            reason,
        };

        let id = self
            .db()
            .generate_id(PREFIX_CHANGE)
            .await
            .map_err(|e| audit_err(e.to_string()))?;
        let changes_json = serde_json::to_string(&changes).map_err(|e| audit_err(e.to_string()))?;
        let created_at = chrono::Utc::now();

        self.db()
            .conn()
            .execute(
                "INSERT INTO change_log (id, table_name, record_id, operation, changes, actor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    table_name,
                    record_id,
                    operation.as_str(),
                    changes_json,
                    actor_id,
                    format_datetime(created_at)
                ],
            )
            .await
            .map_err(|e| audit_err(e.to_string()))?;
        let seq = self.db().conn().last_insert_rowid();

        tracing::debug!(table = table_name, id = record_id, %operation, fields = changes.len(), "change recorded");

        Ok(Some(ChangeRecord {
            id,
            seq,
            table_name: table_name.to_string(),
            record_id: record_id.to_string(),
            operation,
            changes,
            actor_id: actor_id.map(str::to_string),
            created_at,
        }))
    }

    /// Query change records with optional filters, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn query_changes(
        &self,
        filter: &ChangeFilter,
    ) -> Result<Vec<ChangeRecord>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref table) = filter.table_name {
            params.push(libsql::Value::Text(table.clone()));
            conditions.push(format!("table_name = ?{}", params.len()));
        }
        if let Some(ref rid) = filter.record_id {
            params.push(libsql::Value::Text(rid.clone()));
            conditions.push(format!("record_id = ?{}", params.len()));
        }
        if let Some(op) = filter.operation {
            params.push(libsql::Value::Text(op.as_str().to_string()));
            conditions.push(format!("operation = ?{}", params.len()));
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
            "SELECT {SELECT_COLS} FROM change_log {where_clause} ORDER BY seq ASC LIMIT {limit}"
        );

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(row_to_change(&row)?);
        }
        Ok(changes)
    }

    /// Rebuild a record's audited fields by replaying its change history.
    ///
    /// Returns `None` when the record has no history. Excluded fields never
    /// appear in the result.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn replay_changes(
        &self,
        table_name: &str,
        record_id: &str,
    ) -> Result<Option<Fields>, DatabaseError> {
        let filter = ChangeFilter {
            limit: Some(u32::MAX),
            ..ChangeFilter::for_record(table_name, record_id)
        };
        let history = self.query_changes(&filter).await?;
        if history.is_empty() {
            return Ok(None);
        }
        let mut state = Fields::new();
        for change in &history {
            change.changes.apply_to(&mut state);
        }
        Ok(Some(state))
    }
}
