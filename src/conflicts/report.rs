//! Report building and persistence.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::conflicts::messages::MessageCatalog;
use crate::conflicts::model::{
    AmbiguousMatchWarning, CaseId, CheckRequest, ConflictCheckRecord, ConflictLevel,
    ConflictReason, ConflictResult, NewConflictCheck, ReasonCategory,
};
use crate::conflicts::severity::severity_for;
use crate::db::ConflictReportStore;
use crate::error::ConflictError;

/// Collapse reasons that cite the same case for the same category,
/// keeping the highest-confidence one, then order them most severe first.
pub fn dedupe_reasons(reasons: Vec<ConflictReason>) -> Vec<ConflictReason> {
    let mut best: BTreeMap<(CaseId, ReasonCategory), ConflictReason> = BTreeMap::new();
    for reason in reasons {
        let key = (reason.matched_case_id, reason.category);
        match best.get(&key) {
            Some(kept) if !outranks(&reason, kept) => {}
            _ => {
                best.insert(key, reason);
            }
        }
    }

    let mut out: Vec<ConflictReason> = best.into_values().collect();
    out.sort_by(|a, b| {
        severity_for(b.category, b.confidence)
            .cmp(&severity_for(a.category, a.confidence))
            .then(a.matched_case_id.cmp(&b.matched_case_id))
            .then(a.category.cmp(&b.category))
    });
    out
}

// Higher confidence wins; ties go to the lexicographically smaller match so
// the kept reason does not depend on input order.
fn outranks(candidate: &ConflictReason, kept: &ConflictReason) -> bool {
    let key = |r: &ConflictReason| {
        (
            std::cmp::Reverse(r.confidence),
            r.query_slot,
            r.query_name.clone(),
            r.matched_slot,
            r.matched_name.clone(),
        )
    };
    key(candidate) < key(kept)
}

pub fn conflicting_case_ids(reasons: &[ConflictReason]) -> Vec<CaseId> {
    let mut ids: Vec<CaseId> = reasons.iter().map(|r| r.matched_case_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Assemble the record for one check. Reasons must already be deduplicated.
pub fn build_check(
    catalog: &MessageCatalog,
    request: &CheckRequest,
    level: ConflictLevel,
    reasons: Vec<ConflictReason>,
    warnings: Vec<AmbiguousMatchWarning>,
) -> Result<NewConflictCheck, ConflictError> {
    let search_params = serde_json::to_value(request)
        .map_err(|e| ConflictError::Validation(format!("request is not serializable: {e}")))?;
    let recommendations = catalog.recommendations(level, warnings.len())?;
    Ok(NewConflictCheck {
        case_id: request.case_id,
        search_params,
        level,
        conflicting_case_ids: conflicting_case_ids(&reasons),
        reasons,
        recommendations,
        warnings,
        checked_by: request.checked_by.trim().to_string(),
        checked_at: Utc::now(),
    })
}

/// Caller-facing view of a check.
pub fn summarize(check: &NewConflictCheck, report_id: Option<Uuid>) -> ConflictResult {
    ConflictResult {
        level: check.level,
        reasons: check.reasons.iter().map(|r| r.detail_text.clone()).collect(),
        categories: check.reasons.iter().map(|r| r.category).collect(),
        conflicting_case_ids: check.conflicting_case_ids.clone(),
        recommendations: check.recommendations.clone(),
        warnings: check.warnings.clone(),
        report_id,
    }
}

/// Write the record once. On failure the computed result travels inside
/// [`ConflictError::Persistence`] so it is never mistaken for "no conflict".
pub async fn persist(
    store: &dyn ConflictReportStore,
    check: NewConflictCheck,
) -> Result<(ConflictCheckRecord, ConflictResult), ConflictError> {
    match store.insert_report(&check).await {
        Ok(record) => {
            let result = summarize(&check, Some(record.id));
            Ok((record, result))
        }
        Err(source) => Err(ConflictError::Persistence {
            result: Box::new(summarize(&check, None)),
            source,
        }),
    }
}
