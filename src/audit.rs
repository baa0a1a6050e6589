//! Append-only JSONL audit trail of conflict checks.
//!
//! One line per check, written after the engine knows whether the check
//! record reached the store. Lines carry metadata only (ids, level, counts)
//! and never the searched names. With hash chaining on, every line stores
//! the SHA-256 of its own content and the hash of the line before it, and
//! [`verify_chain`] replays the file to find the first edited, dropped or
//! reordered line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AuditConfig;
use crate::conflicts::model::{CheckRequest, ConflictCheckRecord, ConflictLevel, ConflictResult};

pub const CHECK_RECORDED: &str = "conflict_check_recorded";
pub const CHECK_UNRECORDED: &str = "conflict_check_unrecorded";

/// Why a trail line could not be written or failed verification.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit trail I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit line {line} is not valid JSON: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("audit line could not be serialized: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("audit trail {path:?} has mode {mode:o}, expected 600")]
    InsecureMode { path: PathBuf, mode: u32 },

    #[error("audit line {line} carries no hash")]
    Unsealed { line: usize },

    #[error("audit line {line} does not follow the line before it")]
    BrokenLink { line: usize },

    #[error("audit line {line} was modified after it was written")]
    Tampered { line: usize },
}

/// Running totals stamped onto every line.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounters {
    pub checks_recorded: u64,
    pub conflicts_found: u64,
    pub unrecorded_checks: u64,
}

/// One line of the trail. Field order is the hashed byte order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrailLine {
    ts: String,
    event_type: String,
    details: serde_json::Value,
    counters: CheckCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

impl TrailLine {
    /// SHA-256 over the line as serialized without its own `hash`.
    fn digest(&self) -> Result<String, serde_json::Error> {
        let unsealed = TrailLine {
            hash: None,
            ..self.clone()
        };
        let bytes = serde_json::to_vec(&unsealed)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

#[derive(Default)]
struct TrailState {
    counters: CheckCounters,
    last_hash: Option<String>,
}

struct AuditTrail {
    path: PathBuf,
    hash_chain: bool,
    // Counters and chain head move together with the appended line.
    state: Mutex<TrailState>,
}

impl AuditTrail {
    fn new(path: PathBuf, hash_chain: bool) -> Self {
        Self {
            path,
            hash_chain,
            state: Mutex::new(TrailState::default()),
        }
    }

    fn append<F>(&self, event_type: &str, details: serde_json::Value, count: F) -> Result<(), AuditError>
    where
        F: FnOnce(&mut CheckCounters),
    {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut counters = state.counters.clone();
        count(&mut counters);

        let mut line = TrailLine {
            ts: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            details,
            counters,
            prev_hash: None,
            hash: None,
        };
        if self.hash_chain {
            line.prev_hash = state.last_hash.clone();
            line.hash = Some(line.digest().map_err(AuditError::Serialize)?);
        }
        let encoded = serde_json::to_string(&line).map_err(AuditError::Serialize)?;

        let mut file = open_trail(&self.path)?;
        writeln!(file, "{encoded}")?;

        // Only a line that reached the file advances the chain.
        state.counters = line.counters;
        state.last_hash = line.hash;
        Ok(())
    }
}

/// Opens the trail for appending, creating it 0o600. An existing file with
/// any other mode is refused rather than written to.
fn open_trail(path: &Path) -> Result<File, AuditError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o600);
    let file = options.open(path)?;

    #[cfg(unix)]
    {
        let mode = file.metadata()?.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(AuditError::InsecureMode {
                path: path.to_path_buf(),
                mode,
            });
        }
    }
    Ok(file)
}

/// Replays a hash-chained trail and returns how many lines it holds.
///
/// Fails on the first line whose content no longer matches its hash or
/// whose `prev_hash` is not the hash of the line before it. Line numbers in
/// errors are 1-based.
pub fn verify_chain(path: &Path) -> Result<usize, AuditError> {
    let reader = BufReader::new(File::open(path)?);
    let mut previous: Option<String> = None;
    let mut count = 0;

    for (index, raw) in reader.lines().enumerate() {
        let raw = raw?;
        if raw.trim().is_empty() {
            continue;
        }
        let number = index + 1;
        let line: TrailLine =
            serde_json::from_str(&raw).map_err(|source| AuditError::Malformed { line: number, source })?;

        let Some(stored) = line.hash.clone() else {
            return Err(AuditError::Unsealed { line: number });
        };
        if line.prev_hash != previous {
            return Err(AuditError::BrokenLink { line: number });
        }
        if line.digest().map_err(AuditError::Serialize)? != stored {
            return Err(AuditError::Tampered { line: number });
        }

        previous = Some(stored);
        count += 1;
    }
    Ok(count)
}

static TRAIL: OnceLock<AuditTrail> = OnceLock::new();
#[cfg(test)]
static TEST_EVENTS: OnceLock<Mutex<Vec<TestAuditEvent>>> = OnceLock::new();

#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct TestAuditEvent {
    pub event_type: String,
    pub details: serde_json::Value,
}

/// Initialize the process-wide trail. Later calls are ignored.
pub fn init(config: &AuditConfig) {
    if !config.enabled {
        return;
    }

    let _ = TRAIL.set(AuditTrail::new(config.path.clone(), config.hash_chain));
}

/// Returns true if the trail is active.
pub fn enabled() -> bool {
    TRAIL.get().is_some()
}

fn recorded_details(record: &ConflictCheckRecord) -> serde_json::Value {
    serde_json::json!({
        "report_id": record.id.to_string(),
        "case_id": record.case_id,
        "level": record.level.as_str(),
        "reason_count": record.reasons.len(),
        "conflicting_case_ids": record.conflicting_case_ids,
        "warning_count": record.warnings.len(),
        "checked_by": record.checked_by,
    })
}

fn unrecorded_details(request: &CheckRequest, result: &ConflictResult) -> serde_json::Value {
    serde_json::json!({
        "case_id": request.case_id,
        "level": result.level.as_str(),
        "reason_count": result.reasons.len(),
        "conflicting_case_ids": result.conflicting_case_ids,
        "warning_count": result.warnings.len(),
        "checked_by": request.checked_by.trim(),
    })
}

fn emit<F>(event_type: &str, details: serde_json::Value, count: F)
where
    F: FnOnce(&mut CheckCounters),
{
    #[cfg(test)]
    push_test_event(event_type, &details);
    if let Some(trail) = TRAIL.get()
        && let Err(e) = trail.append(event_type, details, count)
    {
        tracing::warn!(event_type, error = %e, "Conflict audit line not written");
    }
}

/// A check whose record is now in the report store.
pub fn record_check(record: &ConflictCheckRecord) {
    let conflict = record.level > ConflictLevel::None;
    emit(CHECK_RECORDED, recorded_details(record), |c| {
        c.checks_recorded += 1;
        if conflict {
            c.conflicts_found += 1;
        }
    });
}

/// A check that produced `result` but whose record could not be written.
pub fn record_unrecorded(request: &CheckRequest, result: &ConflictResult) {
    emit(CHECK_UNRECORDED, unrecorded_details(request, result), |c| {
        c.unrecorded_checks += 1;
    });
}

#[cfg(test)]
fn push_test_event(event_type: &str, details: &serde_json::Value) {
    let events = TEST_EVENTS.get_or_init(|| Mutex::new(Vec::new()));
    if let Ok(mut lock) = events.lock() {
        lock.push(TestAuditEvent {
            event_type: event_type.to_string(),
            details: details.clone(),
        });
    }
}

#[cfg(test)]
pub(crate) fn test_events_snapshot() -> Vec<TestAuditEvent> {
    TEST_EVENTS
        .get()
        .and_then(|events| events.lock().ok().map(|lock| lock.clone()))
        .unwrap_or_default()
}
