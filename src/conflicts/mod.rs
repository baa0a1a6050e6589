//! Conflict-of-interest detection.
//!
//! A check runs normalize → match → classify → resolve severity → build and
//! persist the report. [`ConflictEngine`] wires the stages together.

pub mod classify;
pub mod engine;
pub mod matcher;
pub mod messages;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod severity;

pub use engine::{ConflictEngine, query_identities};
pub use messages::{Locale, MessageCatalog};
pub use model::{
    AffiliatedEntity, AmbiguousMatchWarning, CaseFile, CaseId, CaseRecord, CheckRequest,
    ConflictCheckRecord, ConflictLevel, ConflictReason, ConflictResult, EntityCategory,
    EntitySlot, LawyerAssignment, MatchConfidence, Party, PartyKind, PartyRole, ReasonCategory,
};
pub use notify::{ChannelNotifier, ConflictAlert, ConflictNotifier, TracingNotifier};
