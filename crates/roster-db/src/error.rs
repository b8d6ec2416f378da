//! Database error types for roster-db.

use roster_core::errors::{SchemaError, ValidationError};
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Field values broke their schema rules. Nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A unique field value is already taken by another record. Nothing was written.
    #[error("Conflict: {kind} with {field} = {value} already exists")]
    Conflict {
        kind: String,
        field: String,
        value: String,
    },

    /// No record with this id.
    #[error("Not found: {kind} {id}")]
    NotFound { kind: String, id: String },

    /// The entity kind has no registered schema.
    #[error("Unknown entity kind: {0}")]
    UnknownEntity(String),

    /// The schema descriptor itself is invalid.
    #[error("Invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),

    /// A change or event record could not be appended.
    #[error("Audit write to {table} failed: {reason}")]
    AuditWrite { table: String, reason: String },

    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
