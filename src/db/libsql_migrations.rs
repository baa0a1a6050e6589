//! libSQL schema for the conflict corpus and check records.
//!
//! Affiliated entities live in their own table keyed by `(case_id, category)`
//! with name and identifier indices, next to the party table, so the
//! matcher's lookups are index scans rather than blob parsing.

use std::collections::HashSet;

use libsql::params;

use crate::error::DatabaseError;

const V1_CONFLICT_CORPUS: &str = "
CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY,
    case_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS case_parties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL REFERENCES cases(id),
    role TEXT NOT NULL CHECK (role IN ('client', 'opponent')),
    kind TEXT NOT NULL CHECK (kind IN ('legal', 'individual')),
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    identifier TEXT,
    identifier_normalized TEXT,
    UNIQUE (case_id, role)
);
CREATE INDEX IF NOT EXISTS idx_case_parties_name ON case_parties(name_normalized);
CREATE INDEX IF NOT EXISTS idx_case_parties_identifier ON case_parties(identifier_normalized);

CREATE TABLE IF NOT EXISTS affiliated_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_id INTEGER NOT NULL REFERENCES cases(id),
    category TEXT NOT NULL,
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    identifier TEXT,
    identifier_normalized TEXT
);
CREATE INDEX IF NOT EXISTS idx_affiliated_case_category ON affiliated_entities(case_id, category);
CREATE INDEX IF NOT EXISTS idx_affiliated_name ON affiliated_entities(name_normalized);
CREATE INDEX IF NOT EXISTS idx_affiliated_identifier ON affiliated_entities(identifier_normalized);

CREATE TABLE IF NOT EXISTS lawyer_assignments (
    case_id INTEGER NOT NULL REFERENCES cases(id),
    lawyer_id TEXT NOT NULL,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (case_id, lawyer_id)
);
CREATE INDEX IF NOT EXISTS idx_lawyer_assignments_lawyer ON lawyer_assignments(lawyer_id);

CREATE TABLE IF NOT EXISTS conflict_checks (
    id TEXT PRIMARY KEY,
    case_id INTEGER,
    search_params TEXT NOT NULL,
    level TEXT NOT NULL CHECK (level IN ('none', 'low', 'medium', 'high')),
    reasons_json TEXT NOT NULL,
    conflicting_case_ids TEXT NOT NULL,
    recommendations TEXT NOT NULL,
    warnings_json TEXT NOT NULL,
    checked_by TEXT NOT NULL,
    checked_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conflict_checks_case ON conflict_checks(case_id);

CREATE TRIGGER IF NOT EXISTS conflict_checks_no_update
BEFORE UPDATE ON conflict_checks
BEGIN
    SELECT RAISE(ABORT, 'conflict check records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS conflict_checks_no_delete
BEFORE DELETE ON conflict_checks
BEGIN
    SELECT RAISE(ABORT, 'conflict check records are immutable');
END;
";

/// Ordered `(version, name, sql)` migrations.
const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "conflict_corpus", V1_CONFLICT_CORPUS)];

/// Apply every migration not yet recorded in `_migrations`.
pub async fn run(conn: &libsql::Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations ( \
            version INTEGER PRIMARY KEY, \
            name TEXT NOT NULL, \
            applied_at TEXT NOT NULL DEFAULT (datetime('now')) \
         )",
        (),
    )
    .await?;

    let mut applied: HashSet<i64> = HashSet::new();
    let mut rows = conn.query("SELECT version FROM _migrations", ()).await?;
    while let Some(row) = rows.next().await? {
        applied.insert(row.get::<i64>(0)?);
    }

    for (version, name, sql) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }
        tracing::debug!(version, name, "Applying libSQL migration");
        conn.execute_batch(sql).await?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![*version, *name],
        )
        .await?;
    }
    Ok(())
}
