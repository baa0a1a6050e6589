use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a case in the corpus.
pub type CaseId = i64;

/// Side a party takes on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Client,
    Opponent,
}

impl PartyRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Opponent => "opponent",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Self::Client),
            "opponent" => Some(Self::Opponent),
            _ => None,
        }
    }
}

/// Legal person (tax identifier) or natural person (national identifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Legal,
    Individual,
}

impl PartyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Individual => "individual",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "legal" => Some(Self::Legal),
            "individual" => Some(Self::Individual),
            _ => None,
        }
    }
}

/// Relationship of an affiliated entity to its case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    RelatedCompany,
    RelatedIndividual,
    Founder,
    Director,
    Beneficiary,
    ContactPerson,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 6] = [
        Self::RelatedCompany,
        Self::RelatedIndividual,
        Self::Founder,
        Self::Director,
        Self::Beneficiary,
        Self::ContactPerson,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RelatedCompany => "related_company",
            Self::RelatedIndividual => "related_individual",
            Self::Founder => "founder",
            Self::Director => "director",
            Self::Beneficiary => "beneficiary",
            Self::ContactPerson => "contact_person",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "related_company" => Some(Self::RelatedCompany),
            "related_individual" => Some(Self::RelatedIndividual),
            "founder" => Some(Self::Founder),
            "director" => Some(Self::Director),
            "beneficiary" => Some(Self::Beneficiary),
            "contact_person" => Some(Self::ContactPerson),
            _ => None,
        }
    }
}

/// Where an identity sits on a case: a direct party or an affiliated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntitySlot {
    Party(PartyRole),
    Affiliated(EntityCategory),
}

impl EntitySlot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Party(role) => role.as_str(),
            Self::Affiliated(category) => category.as_str(),
        }
    }
}

impl fmt::Display for EntitySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client or opponent on a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub role: PartyRole,
    pub kind: PartyKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl Party {
    pub fn client(kind: PartyKind, name: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            role: PartyRole::Client,
            kind,
            name: name.into(),
            identifier: identifier.map(str::to_string),
        }
    }

    pub fn opponent(kind: PartyKind, name: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            role: PartyRole::Opponent,
            kind,
            name: name.into(),
            identifier: identifier.map(str::to_string),
        }
    }
}

/// A non-party actor linked to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliatedEntity {
    pub category: EntityCategory,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl AffiliatedEntity {
    pub fn new(category: EntityCategory, name: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            category,
            name: name.into(),
            identifier: identifier.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawyerAssignment {
    pub case_id: CaseId,
    pub lawyer_id: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub client: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<Party>,
    pub case_type: String,
    pub created_at: DateTime<Utc>,
}

/// A case together with everything the engine reads about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFile {
    pub case: CaseRecord,
    #[serde(default)]
    pub affiliated: Vec<AffiliatedEntity>,
    #[serde(default)]
    pub assignments: Vec<LawyerAssignment>,
}

impl CaseFile {
    pub fn reviewer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .assignments
            .iter()
            .map(|a| a.lawyer_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Input of an ad-hoc conflict check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub parties: Vec<Party>,
    #[serde(default)]
    pub affiliated: Vec<AffiliatedEntity>,
    #[serde(default)]
    pub reviewer_ids: Vec<String>,
    /// Case left out of the corpus scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_case_id: Option<CaseId>,
    /// Case the resulting record is filed under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseId>,
    pub checked_by: String,
}

impl CheckRequest {
    /// Request equivalent to re-checking a stored case against the rest of the corpus.
    pub fn for_case(file: &CaseFile, checked_by: impl Into<String>) -> Self {
        let mut parties = vec![file.case.client.clone()];
        parties.extend(file.case.opponent.clone());
        Self {
            parties,
            affiliated: file.affiliated.clone(),
            reviewer_ids: file.reviewer_ids(),
            exclude_case_id: Some(file.case.id),
            case_id: Some(file.case.id),
            checked_by: checked_by.into(),
        }
    }
}

/// Canonical comparison key for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    pub name_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_key: Option<String>,
}

/// A normalized descriptor of the query together with its slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryIdentity {
    pub slot: EntitySlot,
    pub display_name: String,
    pub identity: NormalizedIdentity,
}

/// How strongly a candidate is tied to a query identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Name,
    Identifier,
}

impl MatchConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Identifier => "identifier",
        }
    }
}

/// One indexed party or affiliated-entity occurrence in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub case_id: CaseId,
    pub slot: EntitySlot,
    pub name: String,
    pub name_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_key: Option<String>,
}

/// Raw, unclassified match produced by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub query: QueryIdentity,
    pub matched_case_id: CaseId,
    pub matched_slot: EntitySlot,
    pub matched_name: String,
    pub confidence: MatchConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    DirectOpposition,
    PositionSwitch,
    LawyerConflict,
    RelatedEntity,
    CrossEntity,
}

impl ReasonCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectOpposition => "direct_opposition",
            Self::PositionSwitch => "position_switch",
            Self::LawyerConflict => "lawyer_conflict",
            Self::RelatedEntity => "related_entity",
            Self::CrossEntity => "cross_entity",
        }
    }
}

/// Why a candidate matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReason {
    pub category: ReasonCategory,
    pub matched_case_id: CaseId,
    pub confidence: MatchConfidence,
    pub query_slot: EntitySlot,
    pub query_name: String,
    pub matched_slot: EntitySlot,
    pub matched_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewer_ids: Vec<String>,
    pub detail_text: String,
}

/// Ordinal severity of a check.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl ConflictLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Several name-only matches for one query identity; a human should look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatchWarning {
    pub query_slot: EntitySlot,
    pub query_name: String,
    pub match_count: usize,
    pub case_ids: Vec<CaseId>,
}

/// Record contents before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConflictCheck {
    pub case_id: Option<CaseId>,
    pub search_params: serde_json::Value,
    pub level: ConflictLevel,
    pub reasons: Vec<ConflictReason>,
    pub conflicting_case_ids: Vec<CaseId>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<AmbiguousMatchWarning>,
    pub checked_by: String,
    pub checked_at: DateTime<Utc>,
}

/// Persisted, write-once audit record of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCheckRecord {
    pub id: Uuid,
    pub case_id: Option<CaseId>,
    pub search_params: serde_json::Value,
    pub level: ConflictLevel,
    pub reasons: Vec<ConflictReason>,
    pub conflicting_case_ids: Vec<CaseId>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<AmbiguousMatchWarning>,
    pub checked_by: String,
    pub checked_at: DateTime<Utc>,
}

impl ConflictCheckRecord {
    pub fn from_new(id: Uuid, new: NewConflictCheck) -> Self {
        Self {
            id,
            case_id: new.case_id,
            search_params: new.search_params,
            level: new.level,
            reasons: new.reasons,
            conflicting_case_ids: new.conflicting_case_ids,
            recommendations: new.recommendations,
            warnings: new.warnings,
            checked_by: new.checked_by,
            checked_at: new.checked_at,
        }
    }
}

/// What a caller gets back from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResult {
    pub level: ConflictLevel,
    pub reasons: Vec<String>,
    pub categories: Vec<ReasonCategory>,
    pub conflicting_case_ids: Vec<CaseId>,
    pub recommendations: Vec<String>,
    pub warnings: Vec<AmbiguousMatchWarning>,
    /// `None` only inside [`crate::error::ConflictError::Persistence`].
    pub report_id: Option<Uuid>,
}
