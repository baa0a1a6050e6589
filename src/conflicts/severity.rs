//! Severity resolution.

use crate::conflicts::model::{ConflictLevel, ConflictReason, MatchConfidence, ReasonCategory};

/// Severity contributed by a single reason.
pub fn severity_for(category: ReasonCategory, confidence: MatchConfidence) -> ConflictLevel {
    use MatchConfidence::{Identifier, Name};
    use ReasonCategory::*;

    match (category, confidence) {
        (DirectOpposition | PositionSwitch, Identifier) => ConflictLevel::High,
        (LawyerConflict | RelatedEntity, Identifier) => ConflictLevel::Medium,
        (DirectOpposition | PositionSwitch, Name) => ConflictLevel::Medium,
        (CrossEntity, _) => ConflictLevel::Low,
        (LawyerConflict | RelatedEntity, Name) => ConflictLevel::Low,
    }
}

/// Overall level: the maximum over all reasons, `None` when there are none.
///
/// A max-fold, so the result does not depend on reason order.
pub fn resolve(reasons: &[ConflictReason]) -> ConflictLevel {
    reasons
        .iter()
        .map(|r| severity_for(r.category, r.confidence))
        .max()
        .unwrap_or(ConflictLevel::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::model::{EntitySlot, PartyRole};

    fn reason(category: ReasonCategory, confidence: MatchConfidence, case_id: i64) -> ConflictReason {
        ConflictReason {
            category,
            matched_case_id: case_id,
            confidence,
            query_slot: EntitySlot::Party(PartyRole::Opponent),
            query_name: "Q".to_string(),
            matched_slot: EntitySlot::Party(PartyRole::Client),
            matched_name: "M".to_string(),
            reviewer_ids: Vec::new(),
            detail_text: String::new(),
        }
    }

    #[test]
    fn mapping_table() {
        use MatchConfidence::{Identifier, Name};
        use ReasonCategory::*;

        let cases = [
            (DirectOpposition, Identifier, ConflictLevel::High),
            (PositionSwitch, Identifier, ConflictLevel::High),
            (LawyerConflict, Identifier, ConflictLevel::Medium),
            (RelatedEntity, Identifier, ConflictLevel::Medium),
            (DirectOpposition, Name, ConflictLevel::Medium),
            (PositionSwitch, Name, ConflictLevel::Medium),
            (CrossEntity, Identifier, ConflictLevel::Low),
            (CrossEntity, Name, ConflictLevel::Low),
            (LawyerConflict, Name, ConflictLevel::Low),
            (RelatedEntity, Name, ConflictLevel::Low),
        ];
        for (category, confidence, expected) in cases {
            assert_eq!(
                severity_for(category, confidence),
                expected,
                "{category:?} at {confidence:?}"
            );
        }
    }

    #[test]
    fn no_reasons_is_none() {
        assert_eq!(resolve(&[]), ConflictLevel::None);
    }

    #[test]
    fn weak_opposition_and_strong_related_entity_take_the_max() {
        let reasons = [
            reason(ReasonCategory::DirectOpposition, MatchConfidence::Name, 1),
            reason(ReasonCategory::RelatedEntity, MatchConfidence::Identifier, 2),
            reason(ReasonCategory::CrossEntity, MatchConfidence::Name, 3),
        ];
        assert_eq!(resolve(&reasons), ConflictLevel::Medium);
    }

    #[test]
    fn result_is_independent_of_reason_order() {
        let reasons = vec![
            reason(ReasonCategory::CrossEntity, MatchConfidence::Name, 1),
            reason(ReasonCategory::LawyerConflict, MatchConfidence::Identifier, 2),
            reason(ReasonCategory::PositionSwitch, MatchConfidence::Identifier, 3),
            reason(ReasonCategory::RelatedEntity, MatchConfidence::Name, 4),
        ];
        let expected = resolve(&reasons);
        assert_eq!(expected, ConflictLevel::High);

        // Every rotation and its reverse.
        for shift in 0..reasons.len() {
            let mut rotated = reasons.clone();
            rotated.rotate_left(shift);
            assert_eq!(resolve(&rotated), expected);
            rotated.reverse();
            assert_eq!(resolve(&rotated), expected);
        }
    }
}
