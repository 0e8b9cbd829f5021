//! # Identity Newtypes
//!
//! Identifiers for feeds, persons, investigations and the patient numbers
//! that matching runs on. Each identifier is a distinct type: a feed-scoped
//! [`Pid`] cannot be passed where a cross-feed [`PersonId`] is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feed-scoped patient identifier: one sending system's feed of records for a
/// patient. Unique per sending facility + extract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    /// Wrap an existing pid value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the pid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cross-feed person identifier uniting all feeds believed to be the same person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    /// Wrap an existing person id value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the person id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestigationId(Uuid);

impl InvestigationId {
    /// Generate a new random investigation identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an investigation identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InvestigationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InvestigationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The sending facility and extract a submission arrived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedScope {
    /// Sending facility code.
    pub facility: String,
    /// Sending extract (feed type) name.
    pub extract: String,
}

impl FeedScope {
    /// Create a feed scope.
    pub fn new(facility: impl Into<String>, extract: impl Into<String>) -> Self {
        Self {
            facility: facility.into(),
            extract: extract.into(),
        }
    }
}

impl std::fmt::Display for FeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.facility, self.extract)
    }
}

/// A patient number together with the organization that issued it.
///
/// For an MRN the organization is the local assigning authority; for a
/// national identifier it names the national scheme (e.g. "NHS", "CHI").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    /// The number as sent.
    pub value: String,
    /// Issuing organization.
    pub organization: String,
}

impl Identifier {
    /// Create an identifier.
    pub fn new(value: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            organization: organization.into(),
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.organization, self.value)
    }
}

/// A minted `(pid, personId)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonIdentity {
    /// Feed-scoped patient id.
    pub pid: Pid,
    /// Cross-feed person id.
    pub person_id: PersonId,
}

impl PersonIdentity {
    /// Create an identity pair.
    pub fn new(pid: Pid, person_id: PersonId) -> Self {
        Self { pid, person_id }
    }
}

impl std::fmt::Display for PersonIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pid, self.person_id)
    }
}

/// A `(pid, personId)` pair produced by a matching query.
pub type MatchCandidate = PersonIdentity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_serializes_transparently() {
        assert_eq!(serde_json::to_string(&Pid::new("A")).unwrap(), r#""A""#);
    }

    #[test]
    fn investigation_id_parses_back() {
        let id = InvestigationId::new();
        let parsed: InvestigationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn identity_display() {
        let identity = PersonIdentity::new(Pid::new("A"), PersonId::new("U1"));
        assert_eq!(identity.to_string(), "A/U1");
        assert_eq!(FeedScope::new("RXX", "PV").to_string(), "RXX/PV");
        assert_eq!(Identifier::new("123", "NHS").to_string(), "NHS:123");
    }
}
