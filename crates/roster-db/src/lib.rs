//! # roster-db
//!
//! libSQL storage for Roster.
//!
//! Handles all relational state: schema-driven entity tables, the
//! append-only change log, the five event logs, and the task gate.
//! Entity tables are created when a schema is registered; the log and
//! gate tables come from embedded migrations.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) for local files and
//! in-memory databases.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use error::DatabaseError;
use libsql::Builder;

/// Default wait for a competing writer before `SQLITE_BUSY` surfaces.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Central database handle for all Roster state operations.
///
/// Wraps a libSQL database and connection. Provides ID generation
/// and table introspection.
pub struct RosterDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl RosterDb {
    /// Open a local database at the given path with the default busy timeout.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Self::open_local_with(path, DEFAULT_BUSY_TIMEOUT).await
    }

    /// Open a local database, waiting up to `busy_timeout` for locks held
    /// by other connections.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local_with(path: &str, busy_timeout: Duration) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        // busy_timeout echoes the new value as a row, so it goes through query
        let mut rows = conn
            .query(&format!("PRAGMA busy_timeout = {}", busy_timeout.as_millis()), ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA busy_timeout: {e}")))?;
        while rows.next().await?.is_some() {}

        let roster_db = Self { db, conn };
        roster_db.run_migrations().await?;
        tracing::debug!(path, busy_timeout_ms = %busy_timeout.as_millis(), "database opened");
        Ok(roster_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"per-a3f8b2c1"`.
    ///
    /// Uses `randomblob(4)` in SQL to produce 8-char hex, then prepends the prefix.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }

    /// Whether a table with this name exists.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the catalog query fails.
    pub async fn table_exists(&self, table: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }
}
