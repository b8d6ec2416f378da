//! Service layer orchestrating entity writes with change auditing.
//!
//! `RosterService` wraps `RosterDb` (raw database access), the
//! `SchemaRegistry` of entity descriptors, and the audit and task-gate
//! settings. All repo methods are implemented as `impl RosterService`.

use roster_config::{AuditConfig, RosterConfig, TaskGateConfig};
use roster_core::catalog;
use roster_core::errors::SchemaError;
use roster_core::schema::{EntitySchema, SchemaRegistry};
use std::time::Duration;

use crate::RosterDb;
use crate::error::DatabaseError;

/// Orchestrates entity writes with change auditing.
///
/// Every entity mutation follows this protocol:
/// 1. Apply mass-assignment rules and validate
/// 2. Check uniqueness against other rows
/// 3. Write the row (and cascade children) in one transaction
/// 4. Commit, then append a change record outside the transaction
///
/// A failed change record is logged and does not undo step 3.
pub struct RosterService {
    db: RosterDb,
    registry: SchemaRegistry,
    audit: AuditConfig,
    task_gate: TaskGateConfig,
}

impl RosterService {
    /// Create a new service wrapping a local database with default settings.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = RosterDb::open_local(db_path).await?;
        Ok(Self::from_db(db, AuditConfig::default(), TaskGateConfig::default()))
    }

    /// Create a service from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn open(config: &RosterConfig) -> Result<Self, DatabaseError> {
        let db = RosterDb::open_local_with(
            &config.database.path,
            Duration::from_millis(config.database.busy_timeout_ms),
        )
        .await?;
        tracing::info!(
            path = %config.database.path,
            audit_enabled = config.audit.enabled,
            "roster service opened"
        );
        Ok(Self::from_db(
            db,
            config.audit.clone(),
            config.task_gate.clone(),
        ))
    }

    /// Create from an existing `RosterDb`.
    #[must_use]
    pub fn from_db(db: RosterDb, audit: AuditConfig, task_gate: TaskGateConfig) -> Self {
        Self {
            db,
            registry: SchemaRegistry::new(),
            audit,
            task_gate,
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &RosterDb {
        &self.db
    }

    /// Access the schema registry.
    #[must_use]
    pub const fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Access the change-audit settings.
    #[must_use]
    pub const fn audit_config(&self) -> &AuditConfig {
        &self.audit
    }

    /// Access the task-gate settings.
    #[must_use]
    pub const fn task_gate_config(&self) -> &TaskGateConfig {
        &self.task_gate
    }

    /// Register an entity schema and create its table if missing.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InvalidSchema` for a bad descriptor or a kind
    /// that is already registered, and `DatabaseError::Migration` if the
    /// table cannot be created.
    pub async fn register_schema(&mut self, schema: EntitySchema) -> Result<(), DatabaseError> {
        schema.validate_definition()?;
        if self.registry.get(&schema.kind).is_some() {
            return Err(SchemaError::DuplicateKind(schema.kind).into());
        }

        self.db
            .conn()
            .execute_batch(&create_table_sql(&schema))
            .await
            .map_err(|e| DatabaseError::Migration(format!("{}: {e}", schema.table)))?;

        tracing::debug!(kind = %schema.kind, table = %schema.table, "schema registered");
        self.registry.register(schema)?;
        Ok(())
    }

    /// Register every built-in schema.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register_schema`].
    pub async fn register_catalog(&mut self) -> Result<(), DatabaseError> {
        for schema in catalog::builtin() {
            self.register_schema(schema).await?;
        }
        Ok(())
    }

    /// Look up the schema for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::UnknownEntity` if no schema is registered.
    pub fn schema_for(&self, kind: &str) -> Result<&EntitySchema, DatabaseError> {
        self.registry
            .get(kind)
            .ok_or_else(|| DatabaseError::UnknownEntity(kind.to_string()))
    }
}

/// DDL for a schema's table plus one unique index per unique field.
fn create_table_sql(schema: &EntitySchema) -> String {
    let columns: Vec<String> = schema
        .fields
        .iter()
        .map(|f| format!("    {} {}", f.name, f.kind.sql_type()))
        .collect();

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    id TEXT PRIMARY KEY,\n{columns},\n    created_at TEXT NOT NULL,\n    updated_at TEXT NOT NULL\n);\n",
        table = schema.table,
        columns = columns.join(",\n"),
    );
    for field in schema.unique_fields() {
        sql.push_str(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_{table}_{field} ON {table}({field});\n",
            table = schema.table,
            field = field.name,
        ));
    }
    sql
}
