//! Error types for the conflict engine.

use std::time::Duration;

use crate::conflicts::{CaseId, ConflictResult};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse settings file: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Errors surfaced by a conflict check.
///
/// None of these variants mean "no conflict": a check either returns a
/// [`ConflictResult`] or one of these, and `Persistence` still carries the
/// computed result.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// Malformed input, rejected before any corpus access.
    #[error("Invalid conflict check request: {0}")]
    Validation(String),

    #[error("Case {0} does not exist")]
    CaseNotFound(CaseId),

    /// The corpus could not be read; the conflict status is unknown.
    #[error("Corpus lookup failed, conflict status unknown: {0}")]
    Lookup(#[source] DatabaseError),

    /// The caller-supplied deadline elapsed before the check finished.
    #[error("Conflict check exceeded its deadline of {0:?}")]
    Timeout(Duration),

    /// The check ran but its record could not be written.
    #[error("Conflict check computed level '{}' but the record was not persisted: {source}", .result.level.as_str())]
    Persistence {
        result: Box<ConflictResult>,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to render conflict text: {0}")]
    Template(#[from] tera::Error),
}

impl ConflictError {
    /// The computed result, when the failure happened after classification.
    pub fn computed_result(&self) -> Option<&ConflictResult> {
        match self {
            Self::Persistence { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Lookup(_) | Self::Timeout(_) | Self::Persistence { .. }
        )
    }
}
