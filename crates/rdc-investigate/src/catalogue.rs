//! # Issue-Type Catalogue
//!
//! The fixed enumeration of data-quality issues this stack raises. Ids are
//! stable: they are persisted on every investigation and shared with the
//! tooling that works investigations. Adding a type means adding a variant;
//! every `match` over the catalogue must then handle it.

use serde::{Deserialize, Serialize};

/// The failure classes the identity engine reports as investigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// More than one candidate matched where at most one may.
    Ambiguous,
    /// MRN-derived and NI-derived matches disagree or cannot corroborate.
    Inconsistent,
    /// The matched candidate's demographics do not agree with the submission.
    DemographicMismatch,
    /// An earlier unresolved blocking investigation holds the identity.
    Blocked,
}

/// A catalogued issue type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    /// More than one pid in the feed carries the submitted MRN.
    AmbiguousMrn,
    /// No pid carries the MRN, but pids in the feed carry the submitted NIs.
    AmbiguousNi,
    /// The matched pid's date of birth differs from the submitted one.
    DemographicMismatch,
    /// The MRN matched, but no NI corroborates the match.
    NiNotCorroborated,
    /// The MRN and the NIs identify different pids.
    MrnNiMismatch,
    /// The matched pid has an unresolved blocking investigation.
    BlockedByOpenInvestigation,
    /// A new feed's date of birth differs from the person found in other feeds.
    CrossFeedDemographicMismatch,
    /// A new feed's identifiers match more than one person in other feeds.
    CrossFeedAmbiguous,
}

impl IssueType {
    /// Every catalogued type, ordered by id.
    pub const ALL: [IssueType; 8] = [
        Self::AmbiguousMrn,
        Self::AmbiguousNi,
        Self::DemographicMismatch,
        Self::NiNotCorroborated,
        Self::MrnNiMismatch,
        Self::BlockedByOpenInvestigation,
        Self::CrossFeedDemographicMismatch,
        Self::CrossFeedAmbiguous,
    ];

    /// Persisted catalogue id.
    pub fn id(&self) -> u32 {
        match self {
            Self::AmbiguousMrn => 1,
            Self::AmbiguousNi => 2,
            Self::DemographicMismatch => 3,
            Self::NiNotCorroborated => 4,
            Self::MrnNiMismatch => 5,
            Self::BlockedByOpenInvestigation => 6,
            Self::CrossFeedDemographicMismatch => 7,
            Self::CrossFeedAmbiguous => 8,
        }
    }

    /// Look a type up by its persisted id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AmbiguousMrn => "Multiple patients in this feed share the MRN",
            Self::AmbiguousNi => {
                "National identifier matches a patient in this feed that the MRN does not"
            }
            Self::DemographicMismatch => "Date of birth does not match the matched patient",
            Self::NiNotCorroborated => "No national identifier corroborates the MRN match",
            Self::MrnNiMismatch => "MRN and national identifiers identify different patients",
            Self::BlockedByOpenInvestigation => {
                "Patient has an unresolved blocking investigation"
            }
            Self::CrossFeedDemographicMismatch => {
                "Date of birth does not match the person found in other feeds"
            }
            Self::CrossFeedAmbiguous => "Identifiers match more than one person in other feeds",
        }
    }

    /// Whether the issue is about the patient's data, as opposed to the
    /// state of processing.
    pub fn is_domain_issue(&self) -> bool {
        !matches!(self, Self::BlockedByOpenInvestigation)
    }

    /// The failure class this type reports.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::AmbiguousMrn | Self::AmbiguousNi | Self::CrossFeedAmbiguous => {
                FailureClass::Ambiguous
            }
            Self::NiNotCorroborated | Self::MrnNiMismatch => FailureClass::Inconsistent,
            Self::DemographicMismatch | Self::CrossFeedDemographicMismatch => {
                FailureClass::DemographicMismatch
            }
            Self::BlockedByOpenInvestigation => FailureClass::Blocked,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AmbiguousMrn => "AMBIGUOUS_MRN",
            Self::AmbiguousNi => "AMBIGUOUS_NI",
            Self::DemographicMismatch => "DEMOGRAPHIC_MISMATCH",
            Self::NiNotCorroborated => "NI_NOT_CORROBORATED",
            Self::MrnNiMismatch => "MRN_NI_MISMATCH",
            Self::BlockedByOpenInvestigation => "BLOCKED_BY_OPEN_INVESTIGATION",
            Self::CrossFeedDemographicMismatch => "CROSS_FEED_DEMOGRAPHIC_MISMATCH",
            Self::CrossFeedAmbiguous => "CROSS_FEED_AMBIGUOUS",
        };
        f.write_str(s)
    }
}
