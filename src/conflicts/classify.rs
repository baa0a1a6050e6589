//! Relationship classification of raw candidates.
//!
//! Each candidate gets at most one party-relationship reason, decided by the
//! first rule that applies:
//!
//! 1. position switch: query client was the matched case's opponent *and*
//!    query opponent was that case's client (checked first because it
//!    refines direct opposition)
//! 2. direct opposition: query client ↔ matched opponent, or query
//!    opponent ↔ matched client
//! 3. related entity: a direct party on one side, a principal affiliated
//!    category (every category except `related_company` by default) on the other
//! 4. cross entity: a direct party against a non-principal affiliated
//!    category, or affiliated entities on both sides
//!
//! Client ↔ client and opponent ↔ opponent matches carry no reason.
//!
//! Lawyer conflicts are an overlay on top of that: when the query opponent
//! matches the client of a case one of the query's reviewers worked on, a
//! separate `lawyer_conflict` reason is added for the same candidate.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::conflicts::messages::{MessageCatalog, ReasonText};
use crate::conflicts::model::{
    CaseId, ConflictCandidate, ConflictReason, EntityCategory, EntitySlot, PartyRole,
    ReasonCategory,
};
use crate::error::ConflictError;

pub struct Classifier<'a> {
    catalog: &'a MessageCatalog,
    principal_categories: &'a [EntityCategory],
    reviewer_cases: &'a BTreeMap<String, BTreeSet<CaseId>>,
    /// `(matched case, query role, matched role)` for every party-to-party candidate.
    party_pairs: HashSet<(CaseId, PartyRole, PartyRole)>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        catalog: &'a MessageCatalog,
        principal_categories: &'a [EntityCategory],
        candidates: &[ConflictCandidate],
        reviewer_cases: &'a BTreeMap<String, BTreeSet<CaseId>>,
    ) -> Self {
        let party_pairs = candidates
            .iter()
            .filter_map(|c| match (c.query.slot, c.matched_slot) {
                (EntitySlot::Party(ours), EntitySlot::Party(theirs)) => {
                    Some((c.matched_case_id, ours, theirs))
                }
                _ => None,
            })
            .collect();
        Self {
            catalog,
            principal_categories,
            reviewer_cases,
            party_pairs,
        }
    }

    fn is_principal(&self, category: EntityCategory) -> bool {
        self.principal_categories.contains(&category)
    }

    /// Party-relationship category of a candidate, if it is relevant at all.
    pub fn relationship(&self, candidate: &ConflictCandidate) -> Option<ReasonCategory> {
        use PartyRole::{Client, Opponent};

        let case_id = candidate.matched_case_id;
        match (candidate.query.slot, candidate.matched_slot) {
            (EntitySlot::Party(Client), EntitySlot::Party(Opponent)) => {
                if self.party_pairs.contains(&(case_id, Opponent, Client)) {
                    Some(ReasonCategory::PositionSwitch)
                } else {
                    Some(ReasonCategory::DirectOpposition)
                }
            }
            (EntitySlot::Party(Opponent), EntitySlot::Party(Client)) => {
                if self.party_pairs.contains(&(case_id, Client, Opponent)) {
                    Some(ReasonCategory::PositionSwitch)
                } else {
                    Some(ReasonCategory::DirectOpposition)
                }
            }
            (EntitySlot::Party(_), EntitySlot::Party(_)) => None,
            (EntitySlot::Party(_), EntitySlot::Affiliated(category))
            | (EntitySlot::Affiliated(category), EntitySlot::Party(_)) => {
                if self.is_principal(category) {
                    Some(ReasonCategory::RelatedEntity)
                } else {
                    Some(ReasonCategory::CrossEntity)
                }
            }
            (EntitySlot::Affiliated(_), EntitySlot::Affiliated(_)) => {
                Some(ReasonCategory::CrossEntity)
            }
        }
    }

    /// Query reviewers previously assigned to `case_id`, sorted.
    pub fn reviewers_on(&self, case_id: CaseId) -> Vec<String> {
        self.reviewer_cases
            .iter()
            .filter(|(_, cases)| cases.contains(&case_id))
            .map(|(reviewer, _)| reviewer.clone())
            .collect()
    }

    fn reason(
        &self,
        candidate: &ConflictCandidate,
        category: ReasonCategory,
        reviewer_ids: Vec<String>,
    ) -> Result<ConflictReason, ConflictError> {
        let detail_text = self.catalog.reason_text(&ReasonText {
            category,
            case_id: candidate.matched_case_id,
            confidence: candidate.confidence,
            query_slot: candidate.query.slot,
            query_name: &candidate.query.display_name,
            matched_slot: candidate.matched_slot,
            matched_name: &candidate.matched_name,
            reviewer_ids: &reviewer_ids,
        })?;
        Ok(ConflictReason {
            category,
            matched_case_id: candidate.matched_case_id,
            confidence: candidate.confidence,
            query_slot: candidate.query.slot,
            query_name: candidate.query.display_name.clone(),
            matched_slot: candidate.matched_slot,
            matched_name: candidate.matched_name.clone(),
            reviewer_ids,
            detail_text,
        })
    }

    /// All reasons one candidate contributes: its relationship reason and the lawyer overlay.
    pub fn classify(&self, candidate: &ConflictCandidate) -> Result<Vec<ConflictReason>, ConflictError> {
        let mut reasons = Vec::with_capacity(2);
        if let Some(category) = self.relationship(candidate) {
            reasons.push(self.reason(candidate, category, Vec::new())?);
        }

        if candidate.query.slot == EntitySlot::Party(PartyRole::Opponent)
            && candidate.matched_slot == EntitySlot::Party(PartyRole::Client)
        {
            let reviewers = self.reviewers_on(candidate.matched_case_id);
            if !reviewers.is_empty() {
                reasons.push(self.reason(candidate, ReasonCategory::LawyerConflict, reviewers)?);
            }
        }
        Ok(reasons)
    }

    pub fn classify_all(&self, candidates: &[ConflictCandidate]) -> Result<Vec<ConflictReason>, ConflictError> {
        let mut reasons = Vec::new();
        for candidate in candidates {
            reasons.extend(self.classify(candidate)?);
        }
        Ok(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictConfig;
    use crate::conflicts::messages::Locale;
    use crate::conflicts::model::{MatchConfidence, NormalizedIdentity, QueryIdentity};

    const CLIENT: EntitySlot = EntitySlot::Party(PartyRole::Client);
    const OPPONENT: EntitySlot = EntitySlot::Party(PartyRole::Opponent);

    fn candidate(
        query_slot: EntitySlot,
        case_id: CaseId,
        matched_slot: EntitySlot,
        confidence: MatchConfidence,
    ) -> ConflictCandidate {
        ConflictCandidate {
            query: QueryIdentity {
                slot: query_slot,
                display_name: "Query Name".to_string(),
                identity: NormalizedIdentity {
                    name_key: "query name".to_string(),
                    identifier_key: None,
                },
            },
            matched_case_id: case_id,
            matched_slot,
            matched_name: "Matched Name".to_string(),
            confidence,
        }
    }

    struct Fixture {
        catalog: MessageCatalog,
        principal: Vec<EntityCategory>,
        reviewer_cases: BTreeMap<String, BTreeSet<CaseId>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                catalog: MessageCatalog::new(Locale::En).expect("catalog"),
                principal: ConflictConfig::default().principal_categories,
                reviewer_cases: BTreeMap::new(),
            }
        }

        fn categories(&self, candidates: &[ConflictCandidate]) -> Vec<ReasonCategory> {
            let classifier =
                Classifier::new(&self.catalog, &self.principal, candidates, &self.reviewer_cases);
            classifier
                .classify_all(candidates)
                .expect("classify")
                .into_iter()
                .map(|r| r.category)
                .collect()
        }
    }

    #[test]
    fn client_against_prior_opponent_is_direct_opposition() {
        let fixture = Fixture::new();
        let candidates = [candidate(CLIENT, 1, OPPONENT, MatchConfidence::Identifier)];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::DirectOpposition]
        );
    }

    #[test]
    fn swapped_sides_are_a_position_switch() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(CLIENT, 1, OPPONENT, MatchConfidence::Identifier),
            candidate(OPPONENT, 1, CLIENT, MatchConfidence::Name),
        ];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::PositionSwitch, ReasonCategory::PositionSwitch]
        );
    }

    #[test]
    fn swap_across_different_cases_is_not_a_switch() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(CLIENT, 1, OPPONENT, MatchConfidence::Identifier),
            candidate(OPPONENT, 2, CLIENT, MatchConfidence::Identifier),
        ];
        assert_eq!(
            fixture.categories(&candidates),
            vec![
                ReasonCategory::DirectOpposition,
                ReasonCategory::DirectOpposition
            ]
        );
    }

    #[test]
    fn same_side_matches_carry_no_reason() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(CLIENT, 1, CLIENT, MatchConfidence::Identifier),
            candidate(OPPONENT, 2, OPPONENT, MatchConfidence::Identifier),
        ];
        assert!(fixture.categories(&candidates).is_empty());
    }

    #[test]
    fn principal_category_against_party_is_related_entity() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(
                OPPONENT,
                1,
                EntitySlot::Affiliated(EntityCategory::Founder),
                MatchConfidence::Identifier,
            ),
            candidate(
                EntitySlot::Affiliated(EntityCategory::Director),
                2,
                CLIENT,
                MatchConfidence::Identifier,
            ),
        ];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::RelatedEntity, ReasonCategory::RelatedEntity]
        );
    }

    #[test]
    fn related_individual_and_contact_person_are_principal_by_default() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(
                OPPONENT,
                1,
                EntitySlot::Affiliated(EntityCategory::ContactPerson),
                MatchConfidence::Identifier,
            ),
            candidate(
                CLIENT,
                2,
                EntitySlot::Affiliated(EntityCategory::RelatedIndividual),
                MatchConfidence::Name,
            ),
        ];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::RelatedEntity, ReasonCategory::RelatedEntity]
        );
    }

    #[test]
    fn only_related_company_is_non_principal_by_default() {
        let principal = ConflictConfig::default().principal_categories;
        for category in EntityCategory::ALL {
            assert_eq!(
                principal.contains(&category),
                category != EntityCategory::RelatedCompany,
                "{}",
                category.as_str()
            );
        }
    }

    #[test]
    fn associate_category_or_two_affiliates_is_cross_entity() {
        let fixture = Fixture::new();
        let candidates = [
            candidate(
                OPPONENT,
                1,
                EntitySlot::Affiliated(EntityCategory::RelatedCompany),
                MatchConfidence::Identifier,
            ),
            candidate(
                EntitySlot::Affiliated(EntityCategory::Founder),
                2,
                EntitySlot::Affiliated(EntityCategory::Beneficiary),
                MatchConfidence::Name,
            ),
        ];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::CrossEntity, ReasonCategory::CrossEntity]
        );
    }

    #[test]
    fn reviewer_on_prior_client_case_adds_lawyer_conflict() {
        let mut fixture = Fixture::new();
        fixture
            .reviewer_cases
            .insert("lawyer-l".to_string(), BTreeSet::from([1]));
        let candidates = [candidate(OPPONENT, 1, CLIENT, MatchConfidence::Name)];

        let classifier = Classifier::new(
            &fixture.catalog,
            &fixture.principal,
            &candidates,
            &fixture.reviewer_cases,
        );
        let reasons = classifier.classify_all(&candidates).expect("classify");
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0].category, ReasonCategory::DirectOpposition);
        assert_eq!(reasons[1].category, ReasonCategory::LawyerConflict);
        assert_eq!(reasons[1].reviewer_ids, vec!["lawyer-l".to_string()]);
        assert!(reasons[1].detail_text.contains("lawyer-l"));
    }

    #[test]
    fn reviewer_on_unrelated_case_adds_nothing() {
        let mut fixture = Fixture::new();
        fixture
            .reviewer_cases
            .insert("lawyer-l".to_string(), BTreeSet::from([9]));
        let candidates = [candidate(OPPONENT, 1, CLIENT, MatchConfidence::Name)];
        assert_eq!(
            fixture.categories(&candidates),
            vec![ReasonCategory::DirectOpposition]
        );
    }

    #[test]
    fn detail_text_names_case_and_confidence() {
        let fixture = Fixture::new();
        let candidates = [candidate(CLIENT, 12, OPPONENT, MatchConfidence::Name)];
        let classifier = Classifier::new(
            &fixture.catalog,
            &fixture.principal,
            &candidates,
            &fixture.reviewer_cases,
        );
        let reasons = classifier.classify(&candidates[0]).expect("classify");
        assert!(reasons[0].detail_text.contains("#12"));
        assert!(reasons[0].detail_text.contains("name match"));
    }
}
