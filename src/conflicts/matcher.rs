//! Candidate retrieval: turns normalized query identities into raw matches
//! against the historical corpus.
//!
//! Identifier and name matches are both kept. An identity whose identifier
//! differs from a corpus record but whose name key is equal still yields a
//! `name` candidate; it is never promoted to `identifier`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use crate::conflicts::model::{
    AmbiguousMatchWarning, CaseId, ConflictCandidate, CorpusEntry, EntitySlot, MatchConfidence,
    QueryIdentity,
};
use crate::db::{CorpusQuery, CorpusStore};
use crate::error::{ConflictError, DatabaseError};

/// Candidates plus the reviewer assignments read from the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusScan {
    pub candidates: Vec<ConflictCandidate>,
    pub reviewer_cases: BTreeMap<String, BTreeSet<CaseId>>,
}

pub fn build_query(
    identities: &[QueryIdentity],
    reviewer_ids: &[String],
    exclude_case_id: Option<CaseId>,
) -> CorpusQuery {
    CorpusQuery {
        identifier_keys: identities
            .iter()
            .filter_map(|q| q.identity.identifier_key.clone())
            .collect(),
        name_keys: identities
            .iter()
            .map(|q| q.identity.name_key.clone())
            .collect(),
        reviewer_ids: reviewer_ids
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        exclude_case_id,
    }
}

/// Pair every query identity with the corpus entries it matches.
pub fn match_entries(
    identities: &[QueryIdentity],
    entries: &[CorpusEntry],
    exclude_case_id: Option<CaseId>,
) -> Vec<ConflictCandidate> {
    let mut out = Vec::new();
    for query in identities {
        for entry in entries {
            if exclude_case_id == Some(entry.case_id) {
                continue;
            }
            let candidate = |confidence| ConflictCandidate {
                query: query.clone(),
                matched_case_id: entry.case_id,
                matched_slot: entry.slot,
                matched_name: entry.name.clone(),
                confidence,
            };

            if let (Some(ours), Some(theirs)) =
                (&query.identity.identifier_key, &entry.identifier_key)
                && ours == theirs
            {
                out.push(candidate(MatchConfidence::Identifier));
            }
            if query.identity.name_key == entry.name_key {
                out.push(candidate(MatchConfidence::Name));
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Scan the corpus for every identity in one store round-trip.
///
/// A store failure or a lookup slower than `lookup_timeout` is a
/// [`ConflictError::Lookup`]; an empty candidate list only ever means the
/// corpus really holds no match.
pub async fn find_candidates(
    store: &dyn CorpusStore,
    identities: &[QueryIdentity],
    reviewer_ids: &[String],
    exclude_case_id: Option<CaseId>,
    lookup_timeout: Duration,
) -> Result<CorpusScan, ConflictError> {
    let query = build_query(identities, reviewer_ids, exclude_case_id);
    if query.is_empty() {
        return Ok(CorpusScan::default());
    }

    let matches = match tokio::time::timeout(lookup_timeout, store.lookup(&query)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => return Err(ConflictError::Lookup(e)),
        Err(_) => {
            return Err(ConflictError::Lookup(DatabaseError::Timeout(lookup_timeout)));
        }
    };

    let candidates = match_entries(identities, &matches.entries, exclude_case_id);
    tracing::debug!(
        identities = identities.len(),
        entries = matches.entries.len(),
        candidates = candidates.len(),
        "Corpus scan finished"
    );
    Ok(CorpusScan {
        candidates,
        reviewer_cases: matches.reviewer_cases,
    })
}

/// Warn for each query identity with at least `threshold` name-only matches.
///
/// A name match counts as name-only when the same identity has no
/// identifier match against that same corpus record.
pub fn ambiguity_warnings(
    candidates: &[ConflictCandidate],
    threshold: usize,
) -> Vec<AmbiguousMatchWarning> {
    type RecordKey<'a> = (CaseId, EntitySlot, &'a str);

    let confirmed: HashSet<(&QueryIdentity, RecordKey<'_>)> = candidates
        .iter()
        .filter(|c| c.confidence == MatchConfidence::Identifier)
        .map(|c| (&c.query, (c.matched_case_id, c.matched_slot, c.matched_name.as_str())))
        .collect();

    let mut name_only: BTreeMap<&QueryIdentity, BTreeSet<RecordKey<'_>>> = BTreeMap::new();
    for c in candidates {
        if c.confidence != MatchConfidence::Name {
            continue;
        }
        let record = (c.matched_case_id, c.matched_slot, c.matched_name.as_str());
        if !confirmed.contains(&(&c.query, record)) {
            name_only.entry(&c.query).or_default().insert(record);
        }
    }

    name_only
        .into_iter()
        .filter(|(_, records)| records.len() >= threshold)
        .map(|(query, records)| {
            let case_ids: BTreeSet<CaseId> = records.iter().map(|(case_id, _, _)| *case_id).collect();
            AmbiguousMatchWarning {
                query_slot: query.slot,
                query_name: query.display_name.clone(),
                match_count: records.len(),
                case_ids: case_ids.into_iter().collect(),
            }
        })
        .collect()
}
