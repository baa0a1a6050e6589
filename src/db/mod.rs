//! Storage abstraction for the conflict engine.
//!
//! The engine never owns case data. It reads the historical corpus through
//! [`CorpusStore`] and writes check records through [`ConflictReportStore`].
//! Two implementations exist:
//!
//! - `memory`: an in-process corpus guarded by a single `RwLock`, used by
//!   tests and the `memory` backend setting
//! - `libsql` (default feature): an embedded libSQL database with indexed
//!   party and affiliated-entity tables
//!
//! Every corpus read for one check goes through a single
//! [`CorpusStore::lookup`] call so backends can serve it from one consistent
//! snapshot (a read transaction for libSQL, one read guard in memory).

pub mod memory;

#[cfg(feature = "libsql")]
pub mod libsql;

#[cfg(feature = "libsql")]
pub mod libsql_migrations;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::conflicts::model::{CaseFile, CaseId, ConflictCheckRecord, CorpusEntry, NewConflictCheck};
use crate::error::DatabaseError;

/// Create a storage backend from configuration, run migrations, and return it.
pub async fn connect_from_config(config: &DatabaseConfig) -> Result<Arc<dyn Database>, DatabaseError> {
    match config.backend {
        DatabaseBackend::Memory => Ok(Arc::new(memory::MemoryBackend::new())),
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            let backend = libsql::LibSqlBackend::new_local(&config.libsql_path)
                .await
                .map_err(|e| DatabaseError::Pool(e.to_string()))?;
            backend.run_migrations().await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "libsql"))]
        DatabaseBackend::LibSql => Err(DatabaseError::Pool(
            "libSQL backend requested but the 'libsql' feature is disabled".to_string(),
        )),
    }
}

/// Everything one check needs from the corpus, asked in a single round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusQuery {
    pub identifier_keys: BTreeSet<String>,
    pub name_keys: BTreeSet<String>,
    pub reviewer_ids: BTreeSet<String>,
    pub exclude_case_id: Option<CaseId>,
}

impl CorpusQuery {
    pub fn is_empty(&self) -> bool {
        self.identifier_keys.is_empty() && self.name_keys.is_empty() && self.reviewer_ids.is_empty()
    }
}

/// Answer to a [`CorpusQuery`], read from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusMatches {
    /// Party and affiliated-entity rows whose identifier or name key was asked for.
    pub entries: Vec<CorpusEntry>,
    /// For each requested reviewer, the corpus cases they are assigned to.
    pub reviewer_cases: BTreeMap<String, BTreeSet<CaseId>>,
}

/// Read access to the historical case corpus.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Load one case with its affiliated entities and reviewer assignments.
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError>;

    /// Indexed lookup of identifier keys, name keys and reviewer assignments.
    ///
    /// Implementations must answer from one consistent snapshot and must
    /// return an error rather than a partial or empty answer on failure.
    async fn lookup(&self, query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError>;
}

/// Write path used to populate a corpus (seeding, tests, imports).
#[async_trait]
pub trait CorpusWriter: Send + Sync {
    /// Insert a case with all its parties, entities and assignments atomically.
    async fn insert_case(&self, file: &CaseFile) -> Result<(), DatabaseError>;
}

/// Write-once persistence for check records.
#[async_trait]
pub trait ConflictReportStore: Send + Sync {
    async fn insert_report(&self, record: &NewConflictCheck) -> Result<ConflictCheckRecord, DatabaseError>;
    async fn get_report(&self, id: Uuid) -> Result<Option<ConflictCheckRecord>, DatabaseError>;
    async fn list_reports_for_case(&self, case_id: CaseId) -> Result<Vec<ConflictCheckRecord>, DatabaseError>;
}

/// Backend-agnostic supertrait combining every store the engine and CLI use.
#[async_trait]
pub trait Database: CorpusStore + CorpusWriter + ConflictReportStore + Send + Sync {
    /// Run schema migrations for this backend.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

/// Keep only entries matching one of the requested keys and not in the excluded case.
pub(crate) fn entry_matches(entry: &CorpusEntry, query: &CorpusQuery) -> bool {
    if query.exclude_case_id == Some(entry.case_id) {
        return false;
    }
    query.name_keys.contains(&entry.name_key)
        || entry
            .identifier_key
            .as_ref()
            .is_some_and(|key| query.identifier_keys.contains(key))
}
