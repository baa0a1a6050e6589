//! The conflict check pipeline and its two entry points.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::audit;
use crate::config::ConflictConfig;
use crate::conflicts::classify::Classifier;
use crate::conflicts::matcher::{ambiguity_warnings, find_candidates};
use crate::conflicts::messages::MessageCatalog;
use crate::conflicts::model::{
    CaseId, CheckRequest, ConflictCheckRecord, ConflictLevel, ConflictResult, PartyRole,
    QueryIdentity,
};
use crate::conflicts::normalize::{normalize_affiliated, normalize_party};
use crate::conflicts::notify::{ConflictAlert, ConflictNotifier, TracingNotifier};
use crate::conflicts::report::{build_check, dedupe_reasons, persist};
use crate::conflicts::severity;
use crate::db::{ConflictReportStore, CorpusStore, Database};
use crate::error::{ConflictError, DatabaseError};

/// Reject malformed requests and normalize every descriptor.
///
/// Runs before any corpus access.
pub fn query_identities(request: &CheckRequest) -> Result<Vec<QueryIdentity>, ConflictError> {
    if request.checked_by.trim().is_empty() {
        return Err(ConflictError::Validation("checked_by is required".to_string()));
    }

    let clients = request
        .parties
        .iter()
        .filter(|p| p.role == PartyRole::Client)
        .count();
    let opponents = request.parties.len() - clients;
    if clients != 1 {
        return Err(ConflictError::Validation(format!(
            "exactly one client party is required, got {clients}"
        )));
    }
    if opponents > 1 {
        return Err(ConflictError::Validation(format!(
            "at most one opponent party is allowed, got {opponents}"
        )));
    }

    let mut identities = Vec::with_capacity(request.parties.len() + request.affiliated.len());
    for party in &request.parties {
        identities.push(normalize_party(party)?);
    }
    for entity in &request.affiliated {
        identities.push(normalize_affiliated(entity)?);
    }
    identities.sort();
    identities.dedup();
    Ok(identities)
}

pub struct ConflictEngine {
    corpus: Arc<dyn CorpusStore>,
    reports: Arc<dyn ConflictReportStore>,
    notifier: Arc<dyn ConflictNotifier>,
    catalog: MessageCatalog,
    config: ConflictConfig,
}

impl ConflictEngine {
    pub fn new(
        corpus: Arc<dyn CorpusStore>,
        reports: Arc<dyn ConflictReportStore>,
        config: ConflictConfig,
    ) -> Result<Self, ConflictError> {
        Ok(Self {
            corpus,
            reports,
            notifier: Arc::new(TracingNotifier),
            catalog: MessageCatalog::new(config.locale)?,
            config,
        })
    }

    /// Engine reading and writing through one backend.
    pub fn from_database(db: Arc<dyn Database>, config: ConflictConfig) -> Result<Self, ConflictError> {
        let corpus: Arc<dyn CorpusStore> = db.clone();
        let reports: Arc<dyn ConflictReportStore> = db;
        Self::new(corpus, reports, config)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ConflictNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Ad-hoc check of parties that need not belong to a stored case.
    pub async fn check_candidate(&self, request: CheckRequest) -> Result<ConflictResult, ConflictError> {
        let identities = query_identities(&request)?;
        self.run(&request, &identities).await
    }

    /// Re-check a stored case against every other case in the corpus.
    pub async fn check_case(&self, case_id: CaseId, checked_by: &str) -> Result<ConflictResult, ConflictError> {
        if checked_by.trim().is_empty() {
            return Err(ConflictError::Validation("checked_by is required".to_string()));
        }
        let timeout = self.config.lookup_timeout;
        let file = tokio::time::timeout(timeout, self.corpus.load_case(case_id))
            .await
            .map_err(|_| ConflictError::Lookup(DatabaseError::Timeout(timeout)))?
            .map_err(ConflictError::Lookup)?
            .ok_or(ConflictError::CaseNotFound(case_id))?;

        let request = CheckRequest::for_case(&file, checked_by);
        let identities = query_identities(&request)?;
        self.run(&request, &identities).await
    }

    /// [`Self::check_candidate`] bounded by a caller deadline.
    pub async fn check_candidate_within(
        &self,
        request: CheckRequest,
        deadline: Duration,
    ) -> Result<ConflictResult, ConflictError> {
        tokio::time::timeout(deadline, self.check_candidate(request))
            .await
            .map_err(|_| ConflictError::Timeout(deadline))?
    }

    /// [`Self::check_case`] bounded by a caller deadline.
    pub async fn check_case_within(
        &self,
        case_id: CaseId,
        checked_by: &str,
        deadline: Duration,
    ) -> Result<ConflictResult, ConflictError> {
        tokio::time::timeout(deadline, self.check_case(case_id, checked_by))
            .await
            .map_err(|_| ConflictError::Timeout(deadline))?
    }

    /// A previously written check record.
    pub async fn report(&self, id: Uuid) -> Result<Option<ConflictCheckRecord>, ConflictError> {
        self.reports.get_report(id).await.map_err(ConflictError::Lookup)
    }

    /// Every check recorded for `case_id`, oldest first.
    pub async fn reports_for_case(&self, case_id: CaseId) -> Result<Vec<ConflictCheckRecord>, ConflictError> {
        self.reports
            .list_reports_for_case(case_id)
            .await
            .map_err(ConflictError::Lookup)
    }

    async fn run(
        &self,
        request: &CheckRequest,
        identities: &[QueryIdentity],
    ) -> Result<ConflictResult, ConflictError> {
        let scan = find_candidates(
            self.corpus.as_ref(),
            identities,
            &request.reviewer_ids,
            request.exclude_case_id,
            self.config.lookup_timeout,
        )
        .await?;

        let classifier = Classifier::new(
            &self.catalog,
            &self.config.principal_categories,
            &scan.candidates,
            &scan.reviewer_cases,
        );
        let reasons = dedupe_reasons(classifier.classify_all(&scan.candidates)?);
        let level = severity::resolve(&reasons);
        let warnings = ambiguity_warnings(&scan.candidates, self.config.ambiguity_threshold);
        tracing::debug!(
            candidates = scan.candidates.len(),
            reasons = reasons.len(),
            warnings = warnings.len(),
            level = %level,
            "Conflict check classified"
        );

        let check = build_check(&self.catalog, request, level, reasons, warnings)?;
        match persist(self.reports.as_ref(), check).await {
            Ok((record, result)) => {
                self.after_recorded(&record);
                Ok(result)
            }
            Err(err) => {
                if let Some(result) = err.computed_result() {
                    tracing::warn!(
                        case_id = ?request.case_id,
                        level = %result.level,
                        error = %err,
                        "Conflict check result was not recorded"
                    );
                    audit::record_unrecorded(request, result);
                    if result.level > ConflictLevel::None {
                        self.notifier.notify(&ConflictAlert {
                            report_id: None,
                            case_id: request.case_id,
                            level: result.level,
                            categories: result.categories.clone(),
                            conflicting_case_ids: result.conflicting_case_ids.clone(),
                            checked_by: request.checked_by.trim().to_string(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    fn after_recorded(&self, record: &ConflictCheckRecord) {
        tracing::info!(
            report_id = %record.id,
            case_id = ?record.case_id,
            level = %record.level,
            reasons = record.reasons.len(),
            "Conflict check recorded"
        );
        audit::record_check(record);

        if record.level > ConflictLevel::None {
            self.notifier.notify(&ConflictAlert {
                report_id: Some(record.id),
                case_id: record.case_id,
                level: record.level,
                categories: record.reasons.iter().map(|r| r.category).collect(),
                conflicting_case_ids: record.conflicting_case_ids.clone(),
                checked_by: record.checked_by.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::conflicts::model::{
        AffiliatedEntity, CaseFile, CaseRecord, EntityCategory, LawyerAssignment, NewConflictCheck,
        Party, PartyKind, ReasonCategory,
    };
    use crate::conflicts::notify::ChannelNotifier;
    use crate::db::memory::MemoryBackend;
    use crate::db::{CorpusMatches, CorpusQuery, CorpusWriter};

    fn case_file(id: CaseId, client: Party, opponent: Option<Party>, lawyers: &[&str]) -> CaseFile {
        CaseFile {
            case: CaseRecord {
                id,
                client,
                opponent,
                case_type: "litigation".to_string(),
                created_at: Utc::now(),
            },
            affiliated: Vec::new(),
            assignments: lawyers
                .iter()
                .map(|l| LawyerAssignment {
                    case_id: id,
                    lawyer_id: l.to_string(),
                    assigned_at: Utc::now(),
                })
                .collect(),
        }
    }

    fn request(parties: Vec<Party>, checked_by: &str) -> CheckRequest {
        CheckRequest {
            parties,
            affiliated: Vec::new(),
            reviewer_ids: Vec::new(),
            exclude_case_id: None,
            case_id: None,
            checked_by: checked_by.to_string(),
        }
    }

    async fn engine_with(files: Vec<CaseFile>) -> (Arc<MemoryBackend>, ConflictEngine) {
        let db = Arc::new(MemoryBackend::new());
        for file in &files {
            db.insert_case(file).await.expect("insert case");
        }
        let engine = ConflictEngine::from_database(db.clone(), ConflictConfig::default())
            .expect("engine");
        (db, engine)
    }

    struct CountingStore(AtomicUsize);

    #[async_trait]
    impl CorpusStore for CountingStore {
        async fn load_case(&self, _case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn lookup(&self, _query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(CorpusMatches::default())
        }
    }

    #[test]
    fn validation_requires_exactly_one_client() {
        let none = request(
            vec![Party::opponent(PartyKind::Legal, "Beta Inc", None)],
            "clerk",
        );
        assert!(matches!(
            query_identities(&none),
            Err(ConflictError::Validation(msg)) if msg.contains("client")
        ));

        let two_opponents = request(
            vec![
                Party::client(PartyKind::Legal, "Alpha Corp", None),
                Party::opponent(PartyKind::Legal, "Beta Inc", None),
                Party::opponent(PartyKind::Legal, "Gamma Ltd", None),
            ],
            "clerk",
        );
        assert!(matches!(
            query_identities(&two_opponents),
            Err(ConflictError::Validation(msg)) if msg.contains("opponent")
        ));
    }

    #[test]
    fn validation_requires_checked_by_and_names() {
        let anonymous = request(vec![Party::client(PartyKind::Legal, "Alpha", None)], "  ");
        assert!(matches!(
            query_identities(&anonymous),
            Err(ConflictError::Validation(_))
        ));

        let mut blank_affiliate = request(vec![Party::client(PartyKind::Legal, "Alpha", None)], "clerk");
        blank_affiliate
            .affiliated
            .push(AffiliatedEntity::new(EntityCategory::Founder, "...", None));
        assert!(matches!(
            query_identities(&blank_affiliate),
            Err(ConflictError::Validation(msg)) if msg.contains("founder")
        ));
    }

    #[tokio::test]
    async fn invalid_request_never_touches_the_corpus() {
        let store = Arc::new(CountingStore(AtomicUsize::new(0)));
        let engine = ConflictEngine::new(
            store.clone(),
            Arc::new(MemoryBackend::new()),
            ConflictConfig::default(),
        )
        .expect("engine");

        let bad = request(vec![Party::client(PartyKind::Legal, "   ", None)], "clerk");
        let err = engine.check_candidate(bad).await.expect_err("invalid");
        assert!(matches!(err, ConflictError::Validation(_)));

        let err = engine.check_case(1, "").await.expect_err("invalid");
        assert!(matches!(err, ConflictError::Validation(_)));
        assert_eq!(store.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_case_is_reported() {
        let (_db, engine) = engine_with(Vec::new()).await;
        let err = engine.check_case(99, "clerk").await.expect_err("missing");
        assert!(matches!(err, ConflictError::CaseNotFound(99)));
    }

    #[tokio::test]
    async fn conflicts_are_notified_and_clean_checks_are_not() {
        let (_db, engine) = engine_with(vec![case_file(
            1,
            Party::client(PartyKind::Legal, "Alpha Corp", Some("111")),
            Some(Party::opponent(PartyKind::Legal, "Beta Inc", Some("222"))),
            &[],
        )])
        .await;
        let (notifier, mut rx) = ChannelNotifier::new();
        let engine = engine.with_notifier(Arc::new(notifier));

        let clean = request(
            vec![Party::client(PartyKind::Legal, "Delta LLC", Some("444"))],
            "clerk",
        );
        let result = engine.check_candidate(clean).await.expect("clean check");
        assert_eq!(result.level, ConflictLevel::None);
        assert!(rx.try_recv().is_err());

        let conflicted = request(
            vec![Party::client(PartyKind::Legal, "Beta Inc.", Some("222"))],
            "clerk",
        );
        let result = engine.check_candidate(conflicted).await.expect("check");
        assert_eq!(result.level, ConflictLevel::High);

        let alert = rx.try_recv().expect("alert");
        assert_eq!(alert.report_id, result.report_id);
        assert_eq!(alert.categories, vec![ReasonCategory::DirectOpposition]);
        assert_eq!(alert.conflicting_case_ids, vec![1]);
    }

    #[tokio::test]
    async fn recorded_checks_are_audited_with_metadata_only() {
        let (_db, engine) = engine_with(Vec::new()).await;
        let checker = "engine-audit-test";
        let result = engine
            .check_candidate(request(
                vec![Party::client(PartyKind::Individual, "Jane Roe", None)],
                checker,
            ))
            .await
            .expect("check");

        let event = audit::test_events_snapshot()
            .into_iter()
            .find(|e| e.details["checked_by"] == checker)
            .expect("audit event");
        assert_eq!(event.event_type, audit::CHECK_RECORDED);
        assert_eq!(event.details["level"], "none");
        assert_eq!(
            event.details["report_id"].as_str(),
            result.report_id.map(|id| id.to_string()).as_deref()
        );
        assert!(event.details.get("search_params").is_none());
    }

    #[tokio::test]
    async fn report_is_retrievable_by_id() {
        let (_db, engine) = engine_with(Vec::new()).await;
        let mut req = request(
            vec![Party::client(PartyKind::Legal, "Alpha Corp", None)],
            "clerk",
        );
        req.case_id = Some(5);
        let result = engine.check_candidate(req).await.expect("check");
        let id = result.report_id.expect("report id");

        let record = engine.report(id).await.expect("lookup").expect("record");
        assert_eq!(record.level, result.level);
        assert_eq!(record.recommendations, result.recommendations);
        assert_eq!(engine.reports_for_case(5).await.expect("list").len(), 1);
        assert!(engine.report(Uuid::new_v4()).await.expect("lookup").is_none());
    }

    struct SlowStore;

    #[async_trait]
    impl CorpusStore for SlowStore {
        async fn load_case(&self, _case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError> {
            Ok(None)
        }

        async fn lookup(&self, _query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CorpusMatches::default())
        }
    }

    struct HungCaseLoad;

    #[async_trait]
    impl CorpusStore for HungCaseLoad {
        async fn load_case(&self, _case_id: CaseId) -> Result<Option<CaseFile>, DatabaseError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }

        async fn lookup(&self, _query: &CorpusQuery) -> Result<CorpusMatches, DatabaseError> {
            Ok(CorpusMatches::default())
        }
    }

    #[tokio::test]
    async fn hung_case_load_is_bounded_by_lookup_timeout() {
        let reports = Arc::new(MemoryBackend::new());
        let engine = ConflictEngine::new(
            Arc::new(HungCaseLoad),
            reports.clone(),
            ConflictConfig {
                lookup_timeout: Duration::from_millis(25),
                ..ConflictConfig::default()
            },
        )
        .expect("engine");

        let err = tokio::time::timeout(Duration::from_secs(1), engine.check_case(1, "clerk"))
            .await
            .expect("check_case must not outlive the lookup timeout")
            .expect_err("load timed out");
        assert!(matches!(
            err,
            ConflictError::Lookup(DatabaseError::Timeout(d)) if d == Duration::from_millis(25)
        ));
        assert!(err.computed_result().is_none());
        assert_eq!(reports.report_count(), 0);
    }

    struct RejectingReports;

    #[async_trait]
    impl ConflictReportStore for RejectingReports {
        async fn insert_report(
            &self,
            _record: &NewConflictCheck,
        ) -> Result<ConflictCheckRecord, DatabaseError> {
            Err(DatabaseError::Query("disk I/O error".to_string()))
        }

        async fn get_report(&self, _id: Uuid) -> Result<Option<ConflictCheckRecord>, DatabaseError> {
            Ok(None)
        }

        async fn list_reports_for_case(
            &self,
            _case_id: CaseId,
        ) -> Result<Vec<ConflictCheckRecord>, DatabaseError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn unrecorded_conflict_still_alerts_without_a_report_id() {
        let corpus = Arc::new(MemoryBackend::new());
        corpus
            .insert_case(&case_file(
                1,
                Party::client(PartyKind::Legal, "Alpha Corp", Some("111")),
                Some(Party::opponent(PartyKind::Legal, "Beta Inc", Some("222"))),
                &[],
            ))
            .await
            .expect("insert case");
        let (notifier, mut rx) = ChannelNotifier::new();
        let engine = ConflictEngine::new(corpus, Arc::new(RejectingReports), ConflictConfig::default())
            .expect("engine")
            .with_notifier(Arc::new(notifier));
        let checker = "engine-unrecorded-test";

        let mut conflicted = request(
            vec![Party::client(PartyKind::Legal, "Beta Inc", Some("222"))],
            checker,
        );
        conflicted.case_id = Some(6);
        let err = engine.check_candidate(conflicted).await.expect_err("persistence");
        let result = err.computed_result().expect("computed result");
        assert_eq!(result.level, ConflictLevel::High);

        let alert = rx.try_recv().expect("alert");
        assert_eq!(alert.report_id, None);
        assert_eq!(alert.case_id, Some(6));
        assert_eq!(alert.level, ConflictLevel::High);
        assert_eq!(alert.conflicting_case_ids, vec![1]);
        assert_eq!(alert.checked_by, checker);

        let event = audit::test_events_snapshot()
            .into_iter()
            .find(|e| e.details["checked_by"] == checker)
            .expect("audit event");
        assert_eq!(event.event_type, audit::CHECK_UNRECORDED);
        assert_eq!(event.details["level"], "high");

        // A clean check that fails to persist raises no alert.
        let clean = request(
            vec![Party::client(PartyKind::Legal, "Delta LLC", Some("444"))],
            checker,
        );
        engine.check_candidate(clean).await.expect_err("persistence");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn caller_deadline_is_a_typed_timeout() {
        let engine = ConflictEngine::new(
            Arc::new(SlowStore),
            Arc::new(MemoryBackend::new()),
            ConflictConfig {
                lookup_timeout: Duration::from_secs(30),
                ..ConflictConfig::default()
            },
        )
        .expect("engine");

        let req = request(vec![Party::client(PartyKind::Legal, "Alpha", None)], "clerk");
        let err = engine
            .check_candidate_within(req, Duration::from_millis(20))
            .await
            .expect_err("deadline");
        assert!(matches!(err, ConflictError::Timeout(d) if d == Duration::from_millis(20)));
    }
}
