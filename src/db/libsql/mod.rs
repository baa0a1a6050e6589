//! libSQL backend.

mod conflicts;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::DatabaseError;

/// Embedded libSQL database holding the conflict corpus and check records.
#[derive(Clone)]
pub struct LibSqlBackend {
    db: Arc<libsql::Database>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let db = libsql::Builder::new_local(path).build().await?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Fresh connection with a busy timeout so concurrent writers wait instead of failing.
    pub async fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.db.connect()?;
        conn.query("PRAGMA busy_timeout = 5000", ()).await?;
        Ok(conn)
    }
}

impl std::fmt::Debug for LibSqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        // WAL gives readers a stable snapshot for the length of a read transaction.
        conn.query("PRAGMA journal_mode = WAL", ()).await?;
        super::libsql_migrations::run(&conn).await
    }
}

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    match row.get_value(idx)? {
        libsql::Value::Text(s) => Ok(s),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx}: expected text or null, got {other:?}"
        ))),
    }
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> Result<i64, DatabaseError> {
    match row.get_value(idx)? {
        libsql::Value::Integer(v) => Ok(v),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

pub(crate) fn get_opt_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>, DatabaseError> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(v) => Ok(Some(v)),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx}: expected integer or null, got {other:?}"
        ))),
    }
}

pub(crate) fn opt_text(value: Option<&str>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_i64(value: Option<i64>) -> libsql::Value {
    match value {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("invalid timestamp '{raw}': {e}")))
}

/// `?start, ?start+1, ...` for `count` parameters, or `NULL` when empty so `IN (...)` matches nothing.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
