//! Entity record repository.
//!
//! Generic CRUD over every registered `EntitySchema`. Writes go through
//! mass-assignment, validation, and uniqueness checks before touching the
//! table; audited schemas get a change record after each committed write.

use chrono::Utc;
use libsql::TransactionBehavior;
use serde_json::Value;

use roster_core::diff::FieldDiff;
use roster_core::entities::{EntityRecord, Fields};
use roster_core::enums::ChangeOperation;
use roster_core::errors::{FieldViolation, ValidationError};
use roster_core::schema::{EntitySchema, RULE_UNKNOWN_FIELD};

use crate::error::DatabaseError;
use crate::helpers::{col, json_to_sql, parse_datetime, sql_to_json, unique_violation};
use crate::service::RosterService;

/// Filter and paging for [`RosterService::list_records`].
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Field equality filters. A `null` value matches `IS NULL`.
    pub filters: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl RecordQuery {
    /// Add an equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }
}

fn select_cols(schema: &EntitySchema) -> String {
    let mut cols = vec!["id"];
    cols.extend(schema.fields.iter().map(|f| f.name.as_str()));
    cols.extend(["created_at", "updated_at"]);
    cols.join(", ")
}

fn row_to_record(schema: &EntitySchema, row: &libsql::Row) -> Result<EntityRecord, DatabaseError> {
    let mut fields = Fields::new();
    for (i, spec) in schema.fields.iter().enumerate() {
        let value = sql_to_json(spec.kind, row.get_value(col(i + 1))?)?;
        fields.insert(spec.name.clone(), value);
    }
    let n = schema.fields.len();
    Ok(EntityRecord {
        id: row.get::<String>(0)?,
        kind: schema.kind.clone(),
        fields,
        created_at: parse_datetime(&row.get::<String>(col(n + 1))?)?,
        updated_at: parse_datetime(&row.get::<String>(col(n + 2))?)?,
    })
}

/// SQL parameters for every schema field, in declaration order.
fn field_params(schema: &EntitySchema, fields: &Fields) -> Result<Vec<libsql::Value>, DatabaseError> {
    schema
        .fields
        .iter()
        .map(|spec| json_to_sql(spec.kind, fields.get(&spec.name).unwrap_or(&Value::Null)))
        .collect()
}

/// Rendering used in `Conflict` errors: strings unquoted, everything else as JSON.
fn display_value(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

impl RosterService {
    /// Create a record from caller input. Guarded fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity`, `Validation`, or `Conflict` without writing,
    /// or `DatabaseError` if the insert fails.
    pub async fn create_record(
        &self,
        actor: Option<&str>,
        kind: &str,
        input: &Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let schema = self.schema_for(kind)?;
        let (assigned, dropped) = schema.mass_assign(input);
        if !dropped.is_empty() {
            tracing::debug!(kind, ?dropped, "guarded fields dropped on create");
        }
        self.insert_record(actor, schema, assigned).await
    }

    /// Create a record from trusted input, including guarded fields.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_record`].
    pub async fn force_create_record(
        &self,
        actor: Option<&str>,
        kind: &str,
        input: &Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let schema = self.schema_for(kind)?;
        self.insert_record(actor, schema, input.clone()).await
    }

    /// Update a record from caller input. Guarded fields are dropped.
    ///
    /// Fields absent from `input` keep their stored values. An update that
    /// changes nothing writes nothing and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity`, `NotFound`, `Validation`, or `Conflict`
    /// without writing, or `DatabaseError` if the update fails.
    pub async fn update_record(
        &self,
        actor: Option<&str>,
        kind: &str,
        id: &str,
        input: &Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let schema = self.schema_for(kind)?;
        let (assigned, dropped) = schema.mass_assign(input);
        if !dropped.is_empty() {
            tracing::debug!(kind, id, ?dropped, "guarded fields dropped on update");
        }
        self.apply_update(actor, schema, id, assigned).await
    }

    /// Update a record from trusted input, including guarded fields.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_record`].
    pub async fn force_update_record(
        &self,
        actor: Option<&str>,
        kind: &str,
        id: &str,
        input: &Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let schema = self.schema_for(kind)?;
        self.apply_update(actor, schema, id, input.clone()).await
    }

    /// Delete a record and every row of its declared child relations.
    ///
    /// Child tables that were never registered are skipped. Everything from
    /// reading the old values to the last delete runs under `BEGIN IMMEDIATE`;
    /// a concurrent delete of the same record gets `NotFound` and writes no
    /// change record.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity` or `NotFound`, or `DatabaseError` if a delete
    /// fails (in which case nothing is deleted).
    pub async fn delete_record(
        &self,
        actor: Option<&str>,
        kind: &str,
        id: &str,
    ) -> Result<(), DatabaseError> {
        let schema = self.schema_for(kind)?;

        let mut child_tables = Vec::new();
        for child in &schema.children {
            if self.db().table_exists(&child.table).await? {
                child_tables.push(child);
            }
        }

        let tx = self
            .db()
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;
        let result = async {
            let sql = format!(
                "SELECT {} FROM {} WHERE id = ?1",
                select_cols(schema),
                schema.table
            );
            let mut rows = tx.query(&sql, [id]).await?;
            let Some(row) = rows.next().await? else {
                return Err(DatabaseError::NotFound {
                    kind: kind.to_string(),
                    id: id.to_string(),
                });
            };
            let current = row_to_record(schema, &row)?;
            drop(rows);

            let mut purged = 0;
            for child in &child_tables {
                purged += tx
                    .execute(
                        &format!("DELETE FROM {} WHERE {} = ?1", child.table, child.foreign_key),
                        [id],
                    )
                    .await?;
            }
            let deleted = tx
                .execute(&format!("DELETE FROM {} WHERE id = ?1", schema.table), [id])
                .await?;
            if deleted != 1 {
                return Err(DatabaseError::NotFound {
                    kind: kind.to_string(),
                    id: id.to_string(),
                });
            }
            Ok::<_, DatabaseError>((current, purged))
        }
        .await;

        let (current, purged) = match result {
            Ok(done) => {
                tx.commit().await?;
                done
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(kind, id, %rollback_error, "rollback after failed delete");
                }
                return Err(error);
            }
        };

        tracing::info!(kind, id, children = purged, "record deleted");
        self.audit_write(actor, schema, id, ChangeOperation::Delete, FieldDiff::for_delete(&current.fields))
            .await;
        Ok(())
    }

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity`, `NotFound`, or `DatabaseError` if the query fails.
    pub async fn get_record(&self, kind: &str, id: &str) -> Result<EntityRecord, DatabaseError> {
        let schema = self.schema_for(kind)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_cols(schema),
            schema.table
        );
        let mut rows = self.db().conn().query(&sql, [id]).await?;
        match rows.next().await? {
            Some(row) => row_to_record(schema, &row),
            None => Err(DatabaseError::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Fetch a record by its schema's natural key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntity`, `InvalidState` if the schema has no natural
    /// key, or `DatabaseError` if the query fails.
    pub async fn find_by_natural_key(
        &self,
        kind: &str,
        value: impl Into<Value>,
    ) -> Result<Option<EntityRecord>, DatabaseError> {
        let schema = self.schema_for(kind)?;
        let key = schema
            .natural_key
            .as_deref()
            .and_then(|name| schema.field_spec(name))
            .ok_or_else(|| DatabaseError::InvalidState(format!("{kind} has no natural key")))?;

        let value: Value = value.into();
        let param = json_to_sql(key.kind, &value)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            select_cols(schema),
            schema.table,
            key.name
        );
        let mut rows = self.db().conn().query(&sql, [param]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_record(schema, &row)?)),
            None => Ok(None),
        }
    }

    /// List records of a kind, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for filters on undeclared fields, or
    /// `DatabaseError` if the query fails.
    pub async fn list_records(
        &self,
        kind: &str,
        query: &RecordQuery,
    ) -> Result<Vec<EntityRecord>, DatabaseError> {
        let schema = self.schema_for(kind)?;

        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        let mut violations = Vec::new();
        for (name, value) in &query.filters {
            let Some(spec) = schema.field_spec(name) else {
                violations.push(FieldViolation::new(
                    name,
                    RULE_UNKNOWN_FIELD,
                    format!("{name} is not a field of {kind}"),
                ));
                continue;
            };
            if value.is_null() {
                conditions.push(format!("{} IS NULL", spec.name));
            } else {
                params.push(json_to_sql(spec.kind, value)?);
                conditions.push(format!("{} = ?{}", spec.name, params.len()));
            }
        }
        if !violations.is_empty() {
            return Err(ValidationError {
                kind: kind.to_string(),
                violations,
            }
            .into());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = query.limit.map_or(-1, i64::from);
        let sql = format!(
            "SELECT {} FROM {} {where_clause} ORDER BY created_at ASC, rowid ASC LIMIT {limit} OFFSET {}",
            select_cols(schema),
            schema.table,
            query.offset
        );

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_record(schema, &row)?);
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Write pipeline
    // -----------------------------------------------------------------------

    async fn insert_record(
        &self,
        actor: Option<&str>,
        schema: &EntitySchema,
        assigned: Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let mut fields = schema.blank_fields();
        fields.extend(assigned);
        schema.normalize_fields(&mut fields);
        schema.validate_fields(&fields)?;
        self.ensure_unique(schema, &fields, None).await?;

        let id = self.db().generate_id(&schema.id_prefix).await?;
        let now = Utc::now();

        let mut params = vec![libsql::Value::Text(id.clone())];
        params.extend(field_params(schema, &fields)?);
        params.push(libsql::Value::Text(now.to_rfc3339()));
        params.push(libsql::Value::Text(now.to_rfc3339()));

        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table,
            select_cols(schema),
            placeholders.join(", ")
        );
        self.db()
            .conn()
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| conflict_or(e, schema, &fields))?;

        let record = EntityRecord {
            id,
            kind: schema.kind.clone(),
            fields,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(kind = %schema.kind, id = %record.id, "record created");

        self.audit_write(actor, schema, &record.id, ChangeOperation::Create, FieldDiff::for_create(&record.fields))
            .await;
        Ok(record)
    }

    async fn apply_update(
        &self,
        actor: Option<&str>,
        schema: &EntitySchema,
        id: &str,
        assigned: Fields,
    ) -> Result<EntityRecord, DatabaseError> {
        let current = self.get_record(&schema.kind, id).await?;

        let mut fields = current.fields.clone();
        fields.extend(assigned);
        schema.normalize_fields(&mut fields);
        schema.validate_fields(&fields)?;

        let dirty = FieldDiff::between(&current.fields, &fields);
        if dirty.is_empty() {
            tracing::debug!(kind = %schema.kind, id, "update changed nothing");
            return Ok(current);
        }
        self.ensure_unique(schema, &fields, Some(id)).await?;

        let now = Utc::now();
        let mut params = field_params(schema, &fields)?;
        let assignments: Vec<String> = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, spec)| format!("{} = ?{}", spec.name, i + 1))
            .collect();
        params.push(libsql::Value::Text(now.to_rfc3339()));
        let updated_at_idx = params.len();
        params.push(libsql::Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE {} SET {}, updated_at = ?{updated_at_idx} WHERE id = ?{}",
            schema.table,
            assignments.join(", "),
            params.len()
        );
        self.db()
            .conn()
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| conflict_or(e, schema, &fields))?;

        tracing::info!(kind = %schema.kind, id, fields = dirty.len(), "record updated");
        self.audit_write(actor, schema, id, ChangeOperation::Modify, dirty)
            .await;

        Ok(EntityRecord {
            fields,
            updated_at: now,
            ..current
        })
    }

    /// Fail with `Conflict` if another record holds any of this record's unique values.
    async fn ensure_unique(
        &self,
        schema: &EntitySchema,
        fields: &Fields,
        exclude_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        for spec in schema.unique_fields() {
            let value = fields.get(&spec.name).unwrap_or(&Value::Null);
            if value.is_null() {
                continue;
            }
            let sql = format!(
                "SELECT id FROM {} WHERE {} = ?1 AND id != ?2 LIMIT 1",
                schema.table, spec.name
            );
            let mut rows = self
                .db()
                .conn()
                .query(
                    &sql,
                    libsql::params_from_iter([
                        json_to_sql(spec.kind, value)?,
                        libsql::Value::Text(exclude_id.unwrap_or_default().to_string()),
                    ]),
                )
                .await?;
            if rows.next().await?.is_some() {
                return Err(DatabaseError::Conflict {
                    kind: schema.kind.clone(),
                    field: spec.name.clone(),
                    value: display_value(value),
                });
            }
        }
        Ok(())
    }

    /// Append the change record for a committed write. Failures are logged only.
    async fn audit_write(
        &self,
        actor: Option<&str>,
        schema: &EntitySchema,
        record_id: &str,
        operation: ChangeOperation,
        diff: FieldDiff,
    ) {
        if !schema.audited {
            return;
        }
        let excluded = schema.audit_exclusions(&self.audit_config().excluded_fields);
        if let Err(error) = self
            .record_change(&schema.table, record_id, operation, diff.without(&excluded), actor)
            .await
        {
            tracing::warn!(
                kind = %schema.kind,
                id = record_id,
                %operation,
                %error,
                "change record not written; entity write kept"
            );
        }
    }
}

/// Map a UNIQUE index failure (a racing writer) to `Conflict`.
fn conflict_or(error: libsql::Error, schema: &EntitySchema, fields: &Fields) -> DatabaseError {
    match unique_violation(&error, &schema.table) {
        Some(field) => DatabaseError::Conflict {
            kind: schema.kind.clone(),
            value: fields.get(&field).map(display_value).unwrap_or_default(),
            field,
        },
        None => error.into(),
    }
}
