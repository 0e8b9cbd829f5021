//! # Identity and Investigation Rows
//!
//! Persistence shapes for the identity registry and the investigation
//! subsystem. Domain behavior lives in `rdc-identity` and `rdc-investigate`;
//! these types are only what is stored.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rdc_core::{
    ContentDigest, FeedScope, Identifier, InvestigationId, PersonId, PersonIdentity, Pid,
    Timestamp,
};
use serde::{Deserialize, Serialize};

/// Which patient number a matching query searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Facility-local medical record number.
    Mrn,
    /// National identifier.
    National,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mrn => "MRN",
            Self::National => "NI",
        })
    }
}

/// The identity registry row for one pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRegistration {
    /// Feed-scoped patient id.
    pub pid: Pid,
    /// Cross-feed person id.
    pub person_id: PersonId,
    /// Feed the pid belongs to.
    pub feed: FeedScope,
    /// Date of birth last received for this pid.
    pub birth_date: NaiveDate,
    /// MRN the pid was registered under.
    pub mrn: Identifier,
    /// National identifiers seen for this pid.
    pub nis: Vec<Identifier>,
    /// When the pid was minted.
    pub registered_at: Timestamp,
}

impl PatientRegistration {
    /// The `(pid, personId)` pair of this registration.
    pub fn identity(&self) -> PersonIdentity {
        PersonIdentity::new(self.pid.clone(), self.person_id.clone())
    }

    /// Whether this registration carries the identifier of the given kind.
    ///
    /// MRNs compare on value alone: the assigning organization of an MRN is
    /// implied by the feed. National identifiers compare on value and scheme.
    pub fn carries(&self, kind: IdentifierKind, identifier: &Identifier) -> bool {
        match kind {
            IdentifierKind::Mrn => self.mrn.value == identifier.value,
            IdentifierKind::National => self.nis.contains(identifier),
        }
    }
}

/// An identity linked to one or more investigations, deduplicated on `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRow {
    /// Natural key of the identity row: the pid.
    pub key: String,
    /// Feed-scoped patient id.
    pub pid: Pid,
    /// Person id at the time the row was created.
    pub person_id: PersonId,
}

impl IdentityRow {
    /// Build the row for an identity.
    pub fn for_identity(identity: &PersonIdentity) -> Self {
        Self {
            key: identity.pid.as_str().to_string(),
            pid: identity.pid.clone(),
            person_id: identity.person_id.clone(),
        }
    }
}

/// The document snapshot and context attached to an investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Digest of the volatile-stripped canonical document.
    pub digest: ContentDigest,
    /// Filename the document was received under.
    pub filename: Option<String>,
    /// Arbitrary caller metadata.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A persisted investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRow {
    /// Investigation id.
    pub id: InvestigationId,
    /// Catalogue id of the issue type.
    pub issue_type_id: u32,
    /// Human-readable detail.
    pub message: String,
    /// Whether the investigation blocks new submissions for its identities.
    pub blocking: bool,
    /// Whether the investigation has been resolved.
    pub resolved: bool,
    /// When it was opened.
    pub created_at: Timestamp,
    /// When it was resolved.
    pub resolved_at: Option<Timestamp>,
    /// Resolution note.
    pub resolution_note: Option<String>,
    /// Attached document snapshot.
    pub attachment: Option<AttachmentRef>,
    /// Structured context recorded when the issue was opened.
    pub context: BTreeMap<String, serde_json::Value>,
}

/// A recorded permission allowing the NI-derived candidates of a pid to
/// disagree with its MRN-derived candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOverride {
    /// The pid the override applies to.
    pub pid: Pid,
    /// Why the disagreement is permitted.
    pub reason: String,
    /// When the override was recorded.
    pub recorded_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_carries_identifiers() {
        let reg = PatientRegistration {
            pid: Pid::new("A"),
            person_id: PersonId::new("U1"),
            feed: FeedScope::new("RXX", "PV"),
            birth_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            mrn: Identifier::new("123", "LOCAL"),
            nis: vec![Identifier::new("9434765919", "NHS")],
            registered_at: Timestamp::now(),
        };
        assert!(reg.carries(IdentifierKind::Mrn, &Identifier::new("123", "LOCAL")));
        assert!(reg.carries(IdentifierKind::Mrn, &Identifier::new("123", "OTHER")));
        assert!(!reg.carries(IdentifierKind::Mrn, &Identifier::new("124", "LOCAL")));
        assert!(!reg.carries(IdentifierKind::National, &Identifier::new("9434765919", "CHI")));
        assert!(reg.carries(IdentifierKind::National, &Identifier::new("9434765919", "NHS")));
        assert_eq!(reg.identity().to_string(), "A/U1");
    }
}
