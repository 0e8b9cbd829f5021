//! # Patient-Identifying Metadata
//!
//! [`SubmissionHeader`] is the identifying part of a parsed submission exactly
//! as the parser produced it: any field may be missing. [`PatientInfo`] is the
//! validated form identity resolution runs on. A header without an MRN or a
//! birth date is rejected here and never reaches matching.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::RdcError;
use crate::identity::{FeedScope, Identifier};

/// Identifying metadata as read from a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHeader {
    /// Sending facility code.
    pub sending_facility: String,
    /// Sending extract name.
    pub sending_extract: String,
    /// Transport channel the submission arrived on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// When the sending system transmitted the submission. Differs on every
    /// resend of the same data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Version of the schema the submission was validated against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Patient date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    /// Local medical record number and its assigning organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrn: Option<Identifier>,
    /// National identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub national_identifiers: Vec<Identifier>,
}

/// Validated patient-identifying metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInfo {
    /// Sending facility and extract.
    pub feed: FeedScope,
    /// Transport channel.
    pub channel: Option<String>,
    /// Schema version.
    pub schema_version: Option<String>,
    /// Date of birth.
    pub birth_date: NaiveDate,
    /// Medical record number.
    pub mrn: Identifier,
    /// National identifiers, deduplicated, in first-seen order.
    pub nis: Vec<Identifier>,
}

impl PatientInfo {
    /// Validate a header.
    ///
    /// # Errors
    ///
    /// Returns `RdcError::Validation` if the facility, extract, MRN or birth
    /// date is missing or blank.
    pub fn from_header(header: &SubmissionHeader) -> Result<Self, RdcError> {
        if header.sending_facility.trim().is_empty() {
            return Err(RdcError::Validation("sending facility is missing".into()));
        }
        if header.sending_extract.trim().is_empty() {
            return Err(RdcError::Validation("sending extract is missing".into()));
        }
        let mrn = match &header.mrn {
            Some(mrn) if !mrn.value.trim().is_empty() => Identifier::new(
                mrn.value.trim(),
                mrn.organization.trim(),
            ),
            _ => return Err(RdcError::Validation("submission has no MRN".into())),
        };
        let birth_date = header
            .birth_date
            .ok_or_else(|| RdcError::Validation("submission has no birth date".into()))?;

        let mut nis: Vec<Identifier> = Vec::new();
        for ni in &header.national_identifiers {
            let ni = Identifier::new(ni.value.trim(), ni.organization.trim());
            if !ni.value.is_empty() && !nis.contains(&ni) {
                nis.push(ni);
            }
        }

        Ok(Self {
            feed: FeedScope::new(header.sending_facility.trim(), header.sending_extract.trim()),
            channel: header.channel.clone(),
            schema_version: header.schema_version.clone(),
            birth_date,
            mrn,
            nis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> SubmissionHeader {
        SubmissionHeader {
            sending_facility: "RXX".into(),
            sending_extract: "PV".into(),
            birth_date: NaiveDate::from_ymd_opt(1970, 5, 4),
            mrn: Some(Identifier::new(" 123 ", "LOCALHOSP")),
            national_identifiers: vec![
                Identifier::new("9434765919", "NHS"),
                Identifier::new("9434765919", "NHS"),
                Identifier::new("", "CHI"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn valid_header_is_normalized() {
        let info = PatientInfo::from_header(&header()).unwrap();
        assert_eq!(info.mrn.value, "123");
        assert_eq!(info.nis, vec![Identifier::new("9434765919", "NHS")]);
        assert_eq!(info.feed, FeedScope::new("RXX", "PV"));
    }

    #[test]
    fn missing_mrn_rejected() {
        let mut h = header();
        h.mrn = None;
        assert!(matches!(PatientInfo::from_header(&h), Err(RdcError::Validation(_))));
        h.mrn = Some(Identifier::new("   ", "LOCALHOSP"));
        assert!(PatientInfo::from_header(&h).is_err());
    }

    #[test]
    fn missing_birth_date_rejected() {
        let mut h = header();
        h.birth_date = None;
        assert!(PatientInfo::from_header(&h).is_err());
    }
}
