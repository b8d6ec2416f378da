//! Row-to-entity parsing helpers and JSON/SQL value conversion.
//!
//! Entity tables are created from schema descriptors, so values cross the
//! boundary by `FieldKind`: booleans live as 0/1 integers, JSON and
//! timestamps as TEXT.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use roster_core::enums::{EventLog, FieldKind};

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse an optional TEXT column as `Option<DateTime<Utc>>`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string cannot be parsed.
pub fn parse_optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(parse_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Format a timestamp with fixed microsecond precision and a `Z` suffix.
///
/// Fixed width keeps stored timestamps lexicographically ordered.
#[must_use]
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all roster-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|e| DatabaseError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column. Returns `None` for both SQL NULL and empty string.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get::<Option<String>>(idx)? {
        Some(s) if s.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// Extract an optional JSON value from a TEXT column.
///
/// # Errors
///
/// Returns `DatabaseError::Query` if a non-empty string contains invalid JSON.
pub fn parse_optional_json(s: Option<&str>) -> Result<Option<Value>, DatabaseError> {
    match s {
        Some(s) if !s.is_empty() => {
            let val = serde_json::from_str(s)
                .map_err(|e| DatabaseError::Query(format!("Invalid JSON in column: {e}")))?;
            Ok(Some(val))
        }
        _ => Ok(None),
    }
}

/// Map `EventLog` to the corresponding SQL table name.
///
/// Exhaustive match: a new `EventLog` variant forces updating this
/// and the migration.
#[must_use]
pub const fn event_log_to_table(log: EventLog) -> &'static str {
    match log {
        EventLog::Contact => "contact_log",
        EventLog::Status => "status_log",
        EventLog::Email => "email_log",
        EventLog::Note => "note_log",
        EventLog::Action => "action_log",
    }
}

/// Column index as the `i32` libSQL expects.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) const fn col(idx: usize) -> i32 {
    idx as i32
}

/// Convert a validated JSON field value into a libSQL parameter.
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` if the value does not match `kind`.
pub fn json_to_sql(kind: FieldKind, value: &Value) -> Result<libsql::Value, DatabaseError> {
    let converted = match (kind, value) {
        (_, Value::Null) => Some(libsql::Value::Null),
        (FieldKind::Text | FieldKind::Timestamp, Value::String(s)) => {
            Some(libsql::Value::Text(s.clone()))
        }
        (FieldKind::Integer, Value::Number(n)) => n.as_i64().map(libsql::Value::Integer),
        (FieldKind::Real, Value::Number(n)) => n.as_f64().map(libsql::Value::Real),
        (FieldKind::Boolean, Value::Bool(b)) => Some(libsql::Value::Integer(i64::from(*b))),
        (FieldKind::Json, other) => Some(libsql::Value::Text(other.to_string())),
        _ => None,
    };
    converted.ok_or_else(|| {
        DatabaseError::InvalidState(format!("value {value} cannot be stored as {kind}"))
    })
}

/// Convert a stored column value back into JSON.
///
/// # Errors
///
/// Returns `DatabaseError::InvalidState` for column values that do not fit
/// `kind`, and `DatabaseError::Query` for unparseable JSON columns.
pub fn sql_to_json(kind: FieldKind, value: libsql::Value) -> Result<Value, DatabaseError> {
    match (kind, value) {
        (_, libsql::Value::Null) => Ok(Value::Null),
        (FieldKind::Text | FieldKind::Timestamp, libsql::Value::Text(s)) => Ok(Value::String(s)),
        (FieldKind::Integer, libsql::Value::Integer(i)) => Ok(Value::from(i)),
        (FieldKind::Real, libsql::Value::Real(f)) => Ok(serde_json::Number::from_f64(f)
            .map_or(Value::Null, Value::Number)),
        (FieldKind::Real, libsql::Value::Integer(i)) => Ok(kind.normalize(Value::from(i))),
        (FieldKind::Boolean, libsql::Value::Integer(i)) => Ok(Value::Bool(i != 0)),
        (FieldKind::Json, libsql::Value::Text(s)) => Ok(parse_optional_json(Some(&s))?
            .unwrap_or(Value::Null)),
        (kind, other) => Err(DatabaseError::InvalidState(format!(
            "stored value {other:?} does not fit field kind {kind}"
        ))),
    }
}

/// Detect a UNIQUE constraint failure on `table` and return the column name.
///
/// `SQLite` reports these as `UNIQUE constraint failed: table.column`.
pub(crate) fn unique_violation(error: &libsql::Error, table: &str) -> Option<String> {
    let message = error.to_string();
    let prefix = format!("UNIQUE constraint failed: {table}.");
    let start = message.find(&prefix)? + prefix.len();
    let column: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!column.is_empty()).then_some(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_both_datetime_formats() {
        let rfc = parse_datetime("2026-02-09T14:30:00+00:00").unwrap();
        let sqlite = parse_datetime("2026-02-09 14:30:00").unwrap();
        assert_eq!(rfc, sqlite);
        assert!(parse_datetime("not a date").is_err());
    }

    #[test]
    fn formatted_datetimes_have_fixed_width() {
        let whole = parse_datetime("2026-02-09T14:30:00Z").unwrap();
        let fractional = parse_datetime("2026-02-09T14:30:00.5Z").unwrap();
        assert_eq!(format_datetime(whole), "2026-02-09T14:30:00.000000Z");
        assert_eq!(format_datetime(fractional).len(), format_datetime(whole).len());
        assert!(format_datetime(whole) < format_datetime(fractional));
    }

    #[test]
    fn optional_helpers_treat_empty_as_none() {
        assert_eq!(parse_optional_datetime(Some("")).unwrap(), None);
        assert_eq!(parse_optional_json(Some("")).unwrap(), None);
        assert_eq!(
            parse_optional_json(Some("{\"a\":1}")).unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn every_event_log_has_a_table() {
        let tables: std::collections::HashSet<_> =
            EventLog::ALL.iter().map(|log| event_log_to_table(*log)).collect();
        assert_eq!(tables.len(), EventLog::ALL.len());
    }

    #[test]
    fn json_sql_conversion_roundtrips_by_kind() {
        let cases = [
            (FieldKind::Text, json!("Khaki")),
            (FieldKind::Integer, json!(42)),
            (FieldKind::Real, json!(1.5)),
            (FieldKind::Boolean, json!(true)),
            (FieldKind::Timestamp, json!("2026-08-30T12:00:00Z")),
            (FieldKind::Json, json!({"questions": [1, 2, 3]})),
            (FieldKind::Text, Value::Null),
        ];
        for (kind, value) in cases {
            let stored = json_to_sql(kind, &value).unwrap();
            assert_eq!(sql_to_json(kind, stored).unwrap(), value, "{kind}");
        }
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        assert!(json_to_sql(FieldKind::Integer, &json!("twelve")).is_err());
        assert!(sql_to_json(FieldKind::Boolean, libsql::Value::Text("yes".into())).is_err());
    }
}
