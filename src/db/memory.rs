//! In-process corpus and report store.
//!
//! All corpus state lives behind one `RwLock`: `insert_case` takes the write
//! guard for the whole case, `lookup` answers under a single read guard, so a
//! lookup sees a case either completely or not at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::conflicts::model::{
    CaseFile, CaseId, ConflictCheckRecord, CorpusEntry, EntitySlot, NewConflictCheck,
};
use crate::conflicts::normalize::{normalize_identifier, normalize_name};
use crate::db::{
    ConflictReportStore, CorpusMatches, CorpusQuery, CorpusStore, CorpusWriter, Database,
    entry_matches,
};
use crate::error::DatabaseError;

#[derive(Debug, Default)]
struct CorpusState {
    cases: BTreeMap<CaseId, CaseFile>,
    entries: Vec<CorpusEntry>,
    by_name: HashMap<String, Vec<usize>>,
    by_identifier: HashMap<String, Vec<usize>>,
}

impl CorpusState {
    fn index(&mut self, entry: CorpusEntry) {
        let idx = self.entries.len();
        self.by_name.entry(entry.name_key.clone()).or_default().push(idx);
        if let Some(key) = &entry.identifier_key {
            self.by_identifier.entry(key.clone()).or_default().push(idx);
        }
        self.entries.push(entry);
    }
}

/// Corpus entries (parties first, then affiliated entities) for one case file.
pub(crate) fn corpus_entries(file: &CaseFile) -> Vec<CorpusEntry> {
    let case_id = file.case.id;
    let parties = std::iter::once(&file.case.client)
        .chain(file.case.opponent.iter())
        .map(|party| (EntitySlot::Party(party.role), &party.name, &party.identifier));
    let affiliated = file
        .affiliated
        .iter()
        .map(|e| (EntitySlot::Affiliated(e.category), &e.name, &e.identifier));

    parties
        .chain(affiliated)
        .filter_map(|(slot, name, identifier)| {
            let name_key = normalize_name(name);
            if name_key.is_empty() {
                return None;
            }
            Some(CorpusEntry {
                case_id,
                slot,
                name: name.trim().to_string(),
                name_key,
                identifier_key: identifier.as_deref().and_then(normalize_identifier),
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    corpus: RwLock<CorpusState>,
    reports: Mutex<Vec<ConflictCheckRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or_default()
    }
}

fn poisoned(what: &str) -> DatabaseError {
    DatabaseError::Pool(format!("{what} lock poisoned"))
}

#[async_trait]
impl CorpusStore for MemoryBackend {
    async fn load_case(&self, case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError> {
        let state = self.corpus.read().map_err(|_| poisoned("corpus"))?;
        Ok(state.cases.get(&case_id).cloned())
    }

    async fn lookup(&self, query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError> {
        let state = self.corpus.read().map_err(|_| poisoned("corpus"))?;

        let mut hits: BTreeSet<usize> = BTreeSet::new();
        for key in &query.identifier_keys {
            hits.extend(state.by_identifier.get(key).into_iter().flatten());
        }
        for key in &query.name_keys {
            hits.extend(state.by_name.get(key).into_iter().flatten());
        }
        let entries = hits
            .into_iter()
            .map(|idx| &state.entries[idx])
            .filter(|entry| entry_matches(entry, query))
            .cloned()
            .collect();

        let mut reviewer_cases: BTreeMap<String, BTreeSet<CaseId>> = BTreeMap::new();
        for (case_id, file) in &state.cases {
            if query.exclude_case_id == Some(*case_id) {
                continue;
            }
            for assignment in &file.assignments {
                if query.reviewer_ids.contains(&assignment.lawyer_id) {
                    reviewer_cases
                        .entry(assignment.lawyer_id.clone())
                        .or_default()
                        .insert(*case_id);
                }
            }
        }

        Ok(CorpusMatches {
            entries,
            reviewer_cases,
        })
    }
}

#[async_trait]
impl CorpusWriter for MemoryBackend {
    async fn insert_case(&self, file: &CaseFile) -> Result<(), DatabaseError> {
        let mut state = self.corpus.write().map_err(|_| poisoned("corpus"))?;
        if state.cases.contains_key(&file.case.id) {
            return Err(DatabaseError::Duplicate(format!("case {}", file.case.id)));
        }
        for entry in corpus_entries(file) {
            state.index(entry);
        }
        state.cases.insert(file.case.id, file.clone());
        Ok(())
    }
}

#[async_trait]
impl ConflictReportStore for MemoryBackend {
    async fn insert_report(&self, record: &NewConflictCheck) -> Result<ConflictCheckRecord, DatabaseError> {
        let stored = ConflictCheckRecord::from_new(Uuid::new_v4(), record.clone());
        let mut reports = self.reports.lock().map_err(|_| poisoned("reports"))?;
        reports.push(stored.clone());
        Ok(stored)
    }

    async fn get_report(&self, id: Uuid) -> Result<Option<ConflictCheckRecord>, DatabaseError> {
        let reports = self.reports.lock().map_err(|_| poisoned("reports"))?;
        Ok(reports.iter().find(|r| r.id == id).cloned())
    }

    async fn list_reports_for_case(&self, case_id: CaseId) -> Result<Vec<ConflictCheckRecord>, DatabaseError> {
        let reports = self.reports.lock().map_err(|_| poisoned("reports"))?;
        Ok(reports
            .iter()
            .filter(|r| r.case_id == Some(case_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Database for MemoryBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
