//! # Repository Contract
//!
//! The reconciliation engines never see a concrete store. They take an
//! explicit repository handle whose bounds name only what they need:
//!
//! - [`RecordRepository`] — keyed records (merge engine).
//! - [`IdentityRepository`] — patient registrations and matching queries
//!   (identity engine).
//! - [`IssueRepository`] — investigations, identity rows and document
//!   snapshots (investigation subsystem).
//! - [`Transaction`] — the scoped unit of work. Every staged write becomes
//!   visible to other transactions at `commit()` and not before; dropping a
//!   transaction without committing discards it.
//!
//! All operations are synchronous. Reads observe the transaction's own staged
//! writes.

use rdc_core::{
    ContentDigest, FeedScope, Identifier, InvestigationId, MatchCandidate, NaturalKey, PersonId,
    Pid,
};

use crate::error::StoreError;
use crate::record::Record;
use crate::rows::{IdentifierKind, IdentityRow, IssueRow, MatchOverride, PatientRegistration};

/// Keyed record storage.
pub trait RecordRepository {
    /// Fetch a record by kind and natural key.
    fn get_by_key(&self, kind: &str, key: &NaturalKey) -> Result<Option<Record>, StoreError>;

    /// All records of `kind` whose parent is `parent`, ordered by key.
    fn children(&self, kind: &str, parent: &NaturalKey) -> Result<Vec<Record>, StoreError>;

    /// Insert or replace a record.
    fn add(&mut self, record: Record) -> Result<(), StoreError>;

    /// Delete a record. Deleting an absent record is a no-op.
    fn delete(&mut self, kind: &str, key: &NaturalKey) -> Result<(), StoreError>;
}

/// Patient registrations and the matching queries over them.
pub trait IdentityRepository {
    /// `(pid, personId)` pairs whose registration carries any of `values`.
    ///
    /// With `scope` set, only registrations of that feed are searched; with
    /// `None` every feed is searched. Results are deduplicated and ordered by pid.
    fn candidates_by_identifier(
        &self,
        scope: Option<&FeedScope>,
        kind: IdentifierKind,
        values: &[Identifier],
    ) -> Result<Vec<MatchCandidate>, StoreError>;

    /// The registration of a pid.
    fn registration(&self, pid: &Pid) -> Result<Option<PatientRegistration>, StoreError>;

    /// Every registration sharing a person id, ordered by pid.
    fn registrations_for_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Vec<PatientRegistration>, StoreError>;

    /// Insert or replace a registration.
    fn put_registration(&mut self, registration: PatientRegistration) -> Result<(), StoreError>;

    /// Allocate a fresh pid. Allocation is not rolled back.
    fn mint_pid(&mut self) -> Result<Pid, StoreError>;

    /// Allocate a fresh person id. Allocation is not rolled back.
    fn mint_person_id(&mut self) -> Result<PersonId, StoreError>;

    /// The recorded match override for a pid, if any.
    fn match_override(&self, pid: &Pid) -> Result<Option<MatchOverride>, StoreError>;

    /// Record a match override.
    fn put_match_override(&mut self, entry: MatchOverride) -> Result<(), StoreError>;
}

/// Investigations, the identity rows they link to, and document snapshots.
pub trait IssueRepository {
    /// Fetch an identity row by its natural key.
    fn identity_row(&self, key: &str) -> Result<Option<IdentityRow>, StoreError>;

    /// Insert an identity row unless one with the same key exists.
    ///
    /// Returns the row that is stored under the key afterwards; when another
    /// writer got there first, that is the existing row.
    fn insert_identity_row(&mut self, row: IdentityRow) -> Result<IdentityRow, StoreError>;

    /// Insert or replace an investigation.
    fn put_issue(&mut self, issue: IssueRow) -> Result<(), StoreError>;

    /// Fetch an investigation.
    fn issue(&self, id: &InvestigationId) -> Result<Option<IssueRow>, StoreError>;

    /// Link an investigation to an identity row. Linking twice is a no-op.
    fn link_issue(&mut self, id: &InvestigationId, identity_key: &str) -> Result<(), StoreError>;

    /// Identity rows linked to an investigation, ordered by key.
    fn issue_links(&self, id: &InvestigationId) -> Result<Vec<IdentityRow>, StoreError>;

    /// Investigations linked to an identity row.
    fn issues_for_identity(&self, identity_key: &str) -> Result<Vec<IssueRow>, StoreError>;

    /// Every investigation, oldest first.
    fn list_issues(&self) -> Result<Vec<IssueRow>, StoreError>;

    /// Store a document snapshot unless one is already stored under `digest`.
    ///
    /// Returns `true` if the document was newly stored.
    fn put_document_if_absent(
        &mut self,
        digest: &ContentDigest,
        document: serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Fetch a document snapshot.
    fn document(&self, digest: &ContentDigest) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Records inserted or replaced.
    pub records_written: usize,
    /// Records deleted.
    pub records_deleted: usize,
    /// Registrations inserted or replaced.
    pub registrations_written: usize,
    /// Investigations inserted or replaced.
    pub issues_written: usize,
    /// Document snapshots newly stored.
    pub documents_stored: usize,
}

/// A scoped unit of work.
pub trait Transaction {
    /// Atomically apply every staged write.
    ///
    /// # Errors
    ///
    /// On error nothing staged by this transaction is persisted.
    fn commit(self) -> Result<CommitSummary, StoreError>;

    /// Discard every staged write.
    fn rollback(self);
}

/// Everything the orchestrator needs from one transaction.
pub trait Repository: RecordRepository + IdentityRepository + IssueRepository + Transaction {}

impl<T> Repository for T where T: RecordRepository + IdentityRepository + IssueRepository + Transaction {}

/// A store that hands out transactions.
pub trait TransactionalStore {
    /// The transaction type.
    type Tx: Repository;

    /// Begin a unit of work.
    fn begin(&self) -> Self::Tx;
}
