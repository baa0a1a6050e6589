//! Canonical keys for party and affiliated-entity descriptors.

use crate::conflicts::model::{
    AffiliatedEntity, EntitySlot, NormalizedIdentity, Party, QueryIdentity,
};
use crate::error::ConflictError;

/// Lowercase a name and collapse every run of whitespace/punctuation to one space.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = true;

    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push(' ');
            prev_sep = true;
        }
    }

    out.trim_end().to_string()
}

/// Keep only the digits of an identifier; `None` when nothing remains.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

/// Comparable key for one descriptor. Rejects names with no alphanumeric content.
pub fn normalize(name: &str, identifier: Option<&str>) -> Result<NormalizedIdentity, ConflictError> {
    let name_key = normalize_name(name);
    if name_key.is_empty() {
        return Err(ConflictError::Validation(format!(
            "name '{}' is empty after normalization",
            name.trim()
        )));
    }
    Ok(NormalizedIdentity {
        name_key,
        identifier_key: identifier.and_then(normalize_identifier),
    })
}

pub fn normalize_party(party: &Party) -> Result<QueryIdentity, ConflictError> {
    let identity = normalize(&party.name, party.identifier.as_deref()).map_err(|_| {
        ConflictError::Validation(format!("{} party name is required", party.role.as_str()))
    })?;
    Ok(QueryIdentity {
        slot: EntitySlot::Party(party.role),
        display_name: party.name.trim().to_string(),
        identity,
    })
}

pub fn normalize_affiliated(entity: &AffiliatedEntity) -> Result<QueryIdentity, ConflictError> {
    let identity = normalize(&entity.name, entity.identifier.as_deref()).map_err(|_| {
        ConflictError::Validation(format!("{} name is required", entity.category.as_str()))
    })?;
    Ok(QueryIdentity {
        slot: EntitySlot::Affiliated(entity.category),
        display_name: entity.name.trim().to_string(),
        identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::model::{EntityCategory, PartyKind, PartyRole};

    #[test]
    fn names_collapse_case_whitespace_and_punctuation() {
        assert_eq!(normalize_name("  ACME   Corp. "), "acme corp");
        assert_eq!(normalize_name("Mr. Smith"), "mr smith");
        assert_eq!(normalize_name("Smith, John-Paul"), "smith john paul");
        assert_eq!(normalize_name("...!!"), "");
    }

    #[test]
    fn names_keep_non_ascii_letters() {
        assert_eq!(normalize_name("ÇELIK Ltd. Şti."), "çelik ltd şti");
        assert_eq!(normalize_name("Müller GmbH"), "müller gmbh");
    }

    #[test]
    fn identifiers_keep_digits_only() {
        assert_eq!(normalize_identifier("123-456 78/90").as_deref(), Some("1234567890"));
        assert_eq!(normalize_identifier("TR 0012"), Some("0012".to_string()));
        assert_eq!(normalize_identifier("n/a"), None);
        assert_eq!(normalize_identifier(""), None);
    }

    #[test]
    fn empty_name_is_a_validation_error() {
        let party = Party {
            role: PartyRole::Client,
            kind: PartyKind::Legal,
            name: "  - ".to_string(),
            identifier: Some("1".to_string()),
        };
        let err = normalize_party(&party).expect_err("empty name must be rejected");
        assert!(matches!(err, ConflictError::Validation(msg) if msg.contains("client")));
    }

    #[test]
    fn affiliated_entity_keeps_category_slot() {
        let entity = AffiliatedEntity::new(EntityCategory::Founder, " Mr. Smith ", Some("11-22"));
        let identity = normalize_affiliated(&entity).expect("valid entity");
        assert_eq!(identity.slot, EntitySlot::Affiliated(EntityCategory::Founder));
        assert_eq!(identity.display_name, "Mr. Smith");
        assert_eq!(identity.identity.name_key, "mr smith");
        assert_eq!(identity.identity.identifier_key.as_deref(), Some("1122"));
    }
}
