//! # Investigation Service
//!
//! Opens, links, attaches to and resolves investigations inside the caller's
//! transaction. Nothing here commits: an investigation opened while
//! ingesting a submission becomes visible exactly when that submission's
//! transaction does.
//!
//! ## Identity rows
//!
//! Every linked identity is stored once under its natural key (the pid).
//! Opening a second investigation for the same pid reuses the existing row;
//! concurrent transactions that both create it are reconciled at commit by
//! the store's insert-if-absent rule.
//!
//! ## Document snapshots
//!
//! `attach` hashes the JCS-canonical document with the configured volatile
//! fields removed, so a resend that differs only in its transmission
//! timestamp produces the same digest and is stored once.

use std::collections::BTreeMap;

use rdc_core::{
    sha256_digest, CanonicalBytes, ContentDigest, InvestigationId, PersonIdentity, Pid, Timestamp,
};
use rdc_store::{AttachmentRef, IdentityRow, IssueRepository, IssueRow};
use serde::{Deserialize, Serialize};

use crate::catalogue::IssueType;
use crate::error::InvestigationError;
use crate::investigation::Investigation;

/// Configuration of the investigation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationConfig {
    /// JSON pointers removed from a document before it is digested.
    pub volatile_fields: Vec<String>,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            volatile_fields: vec!["/header/sent_at".to_string()],
        }
    }
}

/// Investigation operations over an [`IssueRepository`].
#[derive(Debug, Clone, Default)]
pub struct Investigations {
    config: InvestigationConfig,
}

impl Investigations {
    /// Create the service.
    pub fn new(config: InvestigationConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &InvestigationConfig {
        &self.config
    }

    /// Open an investigation linked to `identities`.
    ///
    /// An empty `message` is replaced by the catalogue description.
    pub fn open<R>(
        &self,
        repo: &mut R,
        issue_type: IssueType,
        identities: &[PersonIdentity],
        blocking: bool,
        message: impl Into<String>,
    ) -> Result<Investigation, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        self.open_with_context(repo, issue_type, identities, blocking, message, BTreeMap::new())
    }

    /// Open an investigation carrying structured context.
    pub fn open_with_context<R>(
        &self,
        repo: &mut R,
        issue_type: IssueType,
        identities: &[PersonIdentity],
        blocking: bool,
        message: impl Into<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<Investigation, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = issue_type.description().to_string();
        }
        let row = IssueRow {
            id: InvestigationId::new(),
            issue_type_id: issue_type.id(),
            message,
            blocking,
            resolved: false,
            created_at: Timestamp::now(),
            resolved_at: None,
            resolution_note: None,
            attachment: None,
            context,
        };
        repo.put_issue(row.clone())?;
        let links = link_identities(repo, &row.id, identities)?;

        let investigation = Investigation::from_parts(row, links)?;
        tracing::warn!(
            investigation = %investigation.id,
            issue_type = %issue_type,
            blocking,
            identities = investigation.identities.len(),
            "investigation opened"
        );
        Ok(investigation)
    }

    /// Link further identities to an existing investigation. Linking is an
    /// append-only union; identities already linked are left as they are.
    pub fn link_later<R>(
        &self,
        repo: &mut R,
        investigation: &mut Investigation,
        identities: &[PersonIdentity],
    ) -> Result<(), InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        link_identities(repo, &investigation.id, identities)?;
        let links = repo.issue_links(&investigation.id)?;
        let refreshed = Investigation::from_parts(investigation.to_row(), links)?;
        investigation.identities = refreshed.identities;
        tracing::debug!(
            investigation = %investigation.id,
            identities = investigation.identities.len(),
            "identities linked"
        );
        Ok(())
    }

    /// Attach the offending document to an investigation.
    ///
    /// The raw document is stored once per digest; the digest, filename and
    /// metadata are recorded against the investigation. Returns the digest.
    pub fn attach<R>(
        &self,
        repo: &mut R,
        investigation: &mut Investigation,
        document: &serde_json::Value,
        filename: Option<&str>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<ContentDigest, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let digest = self.digest(document)?;
        let stored = repo.put_document_if_absent(&digest, document.clone())?;
        investigation.attachment = Some(AttachmentRef {
            digest: digest.clone(),
            filename: filename.map(str::to_string),
            metadata,
        });
        repo.put_issue(investigation.to_row())?;
        tracing::debug!(
            investigation = %investigation.id,
            digest = %digest,
            newly_stored = stored,
            "document attached"
        );
        Ok(digest)
    }

    /// Digest of a document with the volatile fields removed.
    pub fn digest(&self, document: &serde_json::Value) -> Result<ContentDigest, InvestigationError> {
        let canonical = CanonicalBytes::without_fields(document, &self.config.volatile_fields)?;
        Ok(sha256_digest(&canonical))
    }

    /// Mark an investigation resolved. Resolving twice keeps the first
    /// resolution time and note.
    pub fn resolve<R>(
        &self,
        repo: &mut R,
        id: &InvestigationId,
        note: Option<&str>,
    ) -> Result<Investigation, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let mut investigation = self.require(&*repo, id)?;
        if investigation.resolved {
            return Ok(investigation);
        }
        investigation.resolved = true;
        investigation.resolved_at = Some(Timestamp::now());
        investigation.resolution_note = note.map(str::to_string);
        repo.put_issue(investigation.to_row())?;
        tracing::info!(
            investigation = %investigation.id,
            issue_type = %investigation.issue_type,
            "investigation resolved"
        );
        Ok(investigation)
    }

    /// Fetch an investigation.
    pub fn get<R>(
        &self,
        repo: &R,
        id: &InvestigationId,
    ) -> Result<Option<Investigation>, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        match repo.issue(id)? {
            Some(row) => {
                let links = repo.issue_links(id)?;
                Ok(Some(Investigation::from_parts(row, links)?))
            }
            None => Ok(None),
        }
    }

    /// Fetch an investigation that must exist.
    pub fn require<R>(
        &self,
        repo: &R,
        id: &InvestigationId,
    ) -> Result<Investigation, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        self.get(repo, id)?.ok_or(InvestigationError::NotFound(*id))
    }

    /// Unresolved blocking investigations linked to `pid`, oldest first.
    pub fn open_blocking_for<R>(
        &self,
        repo: &R,
        pid: &Pid,
    ) -> Result<Vec<Investigation>, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let mut open = Vec::new();
        for row in repo.issues_for_identity(pid.as_str())? {
            if row.blocking && !row.resolved {
                let links = repo.issue_links(&row.id)?;
                open.push(Investigation::from_parts(row, links)?);
            }
        }
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    /// Every unresolved investigation, oldest first.
    pub fn list_open<R>(&self, repo: &R) -> Result<Vec<Investigation>, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let mut open = Vec::new();
        for row in repo.list_issues()? {
            if !row.resolved {
                let links = repo.issue_links(&row.id)?;
                open.push(Investigation::from_parts(row, links)?);
            }
        }
        Ok(open)
    }

    /// The raw document attached to an investigation, if any.
    pub fn document_for<R>(
        &self,
        repo: &R,
        id: &InvestigationId,
    ) -> Result<Option<serde_json::Value>, InvestigationError>
    where
        R: IssueRepository + ?Sized,
    {
        let investigation = self.require(repo, id)?;
        match investigation.attachment {
            Some(attachment) => Ok(repo.document(&attachment.digest)?),
            None => Ok(None),
        }
    }
}

/// Get-or-create the identity row of each identity and link it to `id`.
fn link_identities<R>(
    repo: &mut R,
    id: &InvestigationId,
    identities: &[PersonIdentity],
) -> Result<Vec<IdentityRow>, InvestigationError>
where
    R: IssueRepository + ?Sized,
{
    for identity in identities {
        let key = identity.pid.as_str();
        let row = match repo.identity_row(key)? {
            Some(existing) => existing,
            None => repo.insert_identity_row(IdentityRow::for_identity(identity))?,
        };
        repo.link_issue(id, &row.key)?;
    }
    Ok(repo.issue_links(id)?)
}
