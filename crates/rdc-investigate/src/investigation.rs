//! # Investigation
//!
//! The domain view of a persisted issue: its catalogue type, the identities
//! it is linked to and the attached document snapshot, assembled from an
//! [`IssueRow`] and its identity links.

use std::collections::BTreeMap;

use rdc_core::{InvestigationId, PersonIdentity, Pid, Timestamp};
use rdc_store::{AttachmentRef, IdentityRow, IssueRow};
use serde::Serialize;

use crate::catalogue::IssueType;
use crate::error::InvestigationError;

/// A recorded data-quality exception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Investigation {
    /// Investigation id.
    pub id: InvestigationId,
    /// Catalogued issue type.
    pub issue_type: IssueType,
    /// Human-readable detail.
    pub message: String,
    /// Whether the investigation holds back further submissions.
    pub blocking: bool,
    /// Whether the investigation has been resolved.
    pub resolved: bool,
    /// When it was opened.
    pub created_at: Timestamp,
    /// When it was resolved.
    pub resolved_at: Option<Timestamp>,
    /// Note recorded on resolution.
    pub resolution_note: Option<String>,
    /// Linked identities, ordered by pid.
    pub identities: Vec<PersonIdentity>,
    /// Attached document snapshot.
    pub attachment: Option<AttachmentRef>,
    /// Structured context recorded when the issue was opened.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Investigation {
    /// Assemble an investigation from its persisted row and identity links.
    pub fn from_parts(row: IssueRow, links: Vec<IdentityRow>) -> Result<Self, InvestigationError> {
        let issue_type = IssueType::from_id(row.issue_type_id)
            .ok_or(InvestigationError::UnknownIssueType(row.issue_type_id))?;
        let mut identities: Vec<PersonIdentity> = links
            .into_iter()
            .map(|link| PersonIdentity::new(link.pid, link.person_id))
            .collect();
        identities.sort();
        identities.dedup();
        Ok(Self {
            id: row.id,
            issue_type,
            message: row.message,
            blocking: row.blocking,
            resolved: row.resolved,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolution_note: row.resolution_note,
            identities,
            attachment: row.attachment,
            context: row.context,
        })
    }

    /// The persisted row for this investigation.
    pub fn to_row(&self) -> IssueRow {
        IssueRow {
            id: self.id,
            issue_type_id: self.issue_type.id(),
            message: self.message.clone(),
            blocking: self.blocking,
            resolved: self.resolved,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            resolution_note: self.resolution_note.clone(),
            attachment: self.attachment.clone(),
            context: self.context.clone(),
        }
    }

    /// Whether this investigation currently prevents merging.
    pub fn is_gate(&self) -> bool {
        self.blocking && !self.resolved
    }

    /// Whether the investigation is linked to `pid`.
    pub fn links(&self, pid: &Pid) -> bool {
        self.identities.iter().any(|identity| &identity.pid == pid)
    }

    /// The linked pids, ordered.
    pub fn pids(&self) -> Vec<Pid> {
        self.identities.iter().map(|identity| identity.pid.clone()).collect()
    }
}

impl std::fmt::Display for Investigation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.id, self.issue_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdc_core::PersonId;

    fn row(type_id: u32) -> IssueRow {
        IssueRow {
            id: InvestigationId::new(),
            issue_type_id: type_id,
            message: "m".into(),
            blocking: true,
            resolved: false,
            created_at: Timestamp::now(),
            resolved_at: None,
            resolution_note: None,
            attachment: None,
            context: BTreeMap::new(),
        }
    }

    #[test]
    fn from_parts_sorts_identities() {
        let links = vec![
            IdentityRow::for_identity(&PersonIdentity::new(Pid::new("B"), PersonId::new("U2"))),
            IdentityRow::for_identity(&PersonIdentity::new(Pid::new("A"), PersonId::new("U1"))),
        ];
        let inv = Investigation::from_parts(row(5), links).unwrap();
        assert_eq!(inv.issue_type, IssueType::MrnNiMismatch);
        assert_eq!(inv.pids(), vec![Pid::new("A"), Pid::new("B")]);
        assert!(inv.is_gate());
        assert!(inv.links(&Pid::new("B")));
        assert_eq!(inv.to_row().issue_type_id, 5);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = Investigation::from_parts(row(77), vec![]).unwrap_err();
        assert!(matches!(err, InvestigationError::UnknownIssueType(77)));
    }
}
