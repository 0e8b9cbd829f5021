//! # In-Memory Repository
//!
//! [`MemoryRepository`] is a thread-safe, cloneable store. All reads and writes
//! go through a [`MemoryTransaction`] obtained from [`MemoryRepository::begin()`]:
//! the transaction stages its writes in a private overlay, reads see the
//! overlay first and committed state second, and `commit()` applies the whole
//! overlay under one write lock.
//!
//! ## Isolation
//!
//! Commits are atomic, not serializable: two transactions that read the same
//! rows and both write them are not detected as conflicting. Callers that
//! process submissions concurrently serialize per identity (see
//! `rdc-ingest::locks`). The one cross-transaction rule enforced here is the
//! identity-row uniqueness constraint: an identity row staged by two
//! transactions is stored once, by whichever commits first.
//!
//! The lock is `parking_lot::RwLock`: non-poisonable, and never held across a
//! call back into caller code.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rdc_core::{
    ContentDigest, FeedScope, Identifier, InvestigationId, MatchCandidate, NaturalKey, PersonId,
    Pid,
};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::Record;
use crate::rows::{IdentifierKind, IdentityRow, IssueRow, MatchOverride, PatientRegistration};
use crate::traits::{
    CommitSummary, IdentityRepository, IssueRepository, RecordRepository, Transaction,
    TransactionalStore,
};

const FIRST_PID: u64 = 1_000_000_001;
const FIRST_PERSON_ID: u64 = 1;

/// Identifier sequences. Allocation is never rolled back, matching database
/// sequence semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequences {
    next_pid: u64,
    next_person_id: u64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            next_pid: FIRST_PID,
            next_person_id: FIRST_PERSON_ID,
        }
    }
}

/// Committed store contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    records: BTreeMap<String, BTreeMap<NaturalKey, Record>>,
    registrations: BTreeMap<Pid, PatientRegistration>,
    overrides: BTreeMap<Pid, MatchOverride>,
    identity_rows: BTreeMap<String, IdentityRow>,
    issues: BTreeMap<InvestigationId, IssueRow>,
    links: BTreeMap<InvestigationId, BTreeSet<String>>,
    documents: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    sequences: Sequences,
}

impl StoreState {
    /// A committed record.
    pub fn record(&self, kind: &str, key: &NaturalKey) -> Option<&Record> {
        self.records.get(kind).and_then(|by_key| by_key.get(key))
    }

    /// Number of committed records of a kind.
    pub fn record_count(&self, kind: &str) -> usize {
        self.records.get(kind).map_or(0, BTreeMap::len)
    }

    /// Number of committed records across all kinds.
    pub fn total_records(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    /// Number of stored document snapshots.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Number of identity rows.
    pub fn identity_row_count(&self) -> usize {
        self.identity_rows.len()
    }

    /// Number of registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }
}

/// Shared handle to an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<StoreState>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding previously committed contents.
    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A copy of the committed contents.
    pub fn snapshot(&self) -> StoreState {
        self.state.read().clone()
    }

    /// Start a transaction.
    pub fn begin(&self) -> MemoryTransaction {
        MemoryTransaction {
            repo: self.clone(),
            staged: Staged::default(),
            finished: false,
        }
    }

    /// Make every subsequent commit fail with `StoreError::CommitFailed`
    /// until switched off again. Exercises the caller's rollback paths.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl TransactionalStore for MemoryRepository {
    type Tx = MemoryTransaction;

    fn begin(&self) -> MemoryTransaction {
        MemoryRepository::begin(self)
    }
}

#[derive(Debug, Default)]
struct Staged {
    records: BTreeMap<(String, NaturalKey), Option<Record>>,
    registrations: BTreeMap<Pid, PatientRegistration>,
    overrides: BTreeMap<Pid, MatchOverride>,
    identity_rows: BTreeMap<String, IdentityRow>,
    issues: BTreeMap<InvestigationId, IssueRow>,
    links: BTreeMap<InvestigationId, BTreeSet<String>>,
    documents: BTreeMap<String, serde_json::Value>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.records.is_empty()
            && self.registrations.is_empty()
            && self.overrides.is_empty()
            && self.identity_rows.is_empty()
            && self.issues.is_empty()
            && self.links.is_empty()
            && self.documents.is_empty()
    }
}

/// A unit of work against a [`MemoryRepository`].
#[derive(Debug)]
pub struct MemoryTransaction {
    repo: MemoryRepository,
    staged: Staged,
    finished: bool,
}

impl MemoryTransaction {
    fn merged_registrations(&self) -> Vec<PatientRegistration> {
        let state = self.repo.state.read();
        let mut merged: BTreeMap<Pid, PatientRegistration> = state.registrations.clone();
        for (pid, reg) in &self.staged.registrations {
            merged.insert(pid.clone(), reg.clone());
        }
        merged.into_values().collect()
    }

    fn merged_links(&self, id: &InvestigationId) -> BTreeSet<String> {
        let state = self.repo.state.read();
        let mut keys = state.links.get(id).cloned().unwrap_or_default();
        if let Some(staged) = self.staged.links.get(id) {
            keys.extend(staged.iter().cloned());
        }
        keys
    }
}

impl RecordRepository for MemoryTransaction {
    fn get_by_key(&self, kind: &str, key: &NaturalKey) -> Result<Option<Record>, StoreError> {
        if let Some(staged) = self.staged.records.get(&(kind.to_string(), key.clone())) {
            return Ok(staged.clone());
        }
        let state = self.repo.state.read();
        Ok(state.records.get(kind).and_then(|m| m.get(key)).cloned())
    }

    fn children(&self, kind: &str, parent: &NaturalKey) -> Result<Vec<Record>, StoreError> {
        let mut merged: BTreeMap<NaturalKey, Record> = {
            let state = self.repo.state.read();
            state
                .records
                .get(kind)
                .map(|m| {
                    m.values()
                        .filter(|r| r.parent.as_ref() == Some(parent))
                        .map(|r| (r.key.clone(), r.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        for ((staged_kind, key), staged) in &self.staged.records {
            if staged_kind != kind {
                continue;
            }
            match staged {
                Some(r) if r.parent.as_ref() == Some(parent) => {
                    merged.insert(key.clone(), r.clone());
                }
                _ => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    fn add(&mut self, record: Record) -> Result<(), StoreError> {
        self.staged
            .records
            .insert((record.kind.clone(), record.key.clone()), Some(record));
        Ok(())
    }

    fn delete(&mut self, kind: &str, key: &NaturalKey) -> Result<(), StoreError> {
        self.staged
            .records
            .insert((kind.to_string(), key.clone()), None);
        Ok(())
    }
}

impl IdentityRepository for MemoryTransaction {
    fn candidates_by_identifier(
        &self,
        scope: Option<&FeedScope>,
        kind: IdentifierKind,
        values: &[Identifier],
    ) -> Result<Vec<MatchCandidate>, StoreError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let found: BTreeSet<MatchCandidate> = self
            .merged_registrations()
            .into_iter()
            .filter(|reg| scope.map_or(true, |s| reg.feed == *s))
            .filter(|reg| values.iter().any(|v| reg.carries(kind, v)))
            .map(|reg| reg.identity())
            .collect();
        Ok(found.into_iter().collect())
    }

    fn registration(&self, pid: &Pid) -> Result<Option<PatientRegistration>, StoreError> {
        if let Some(reg) = self.staged.registrations.get(pid) {
            return Ok(Some(reg.clone()));
        }
        Ok(self.repo.state.read().registrations.get(pid).cloned())
    }

    fn registrations_for_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Vec<PatientRegistration>, StoreError> {
        Ok(self
            .merged_registrations()
            .into_iter()
            .filter(|reg| reg.person_id == *person_id)
            .collect())
    }

    fn put_registration(&mut self, registration: PatientRegistration) -> Result<(), StoreError> {
        self.staged
            .registrations
            .insert(registration.pid.clone(), registration);
        Ok(())
    }

    fn mint_pid(&mut self) -> Result<Pid, StoreError> {
        let mut state = self.repo.state.write();
        let n = state.sequences.next_pid;
        state.sequences.next_pid += 1;
        Ok(Pid::new(n.to_string()))
    }

    fn mint_person_id(&mut self) -> Result<PersonId, StoreError> {
        let mut state = self.repo.state.write();
        let n = state.sequences.next_person_id;
        state.sequences.next_person_id += 1;
        Ok(PersonId::new(n.to_string()))
    }

    fn match_override(&self, pid: &Pid) -> Result<Option<MatchOverride>, StoreError> {
        if let Some(o) = self.staged.overrides.get(pid) {
            return Ok(Some(o.clone()));
        }
        Ok(self.repo.state.read().overrides.get(pid).cloned())
    }

    fn put_match_override(&mut self, entry: MatchOverride) -> Result<(), StoreError> {
        self.staged.overrides.insert(entry.pid.clone(), entry);
        Ok(())
    }
}

impl IssueRepository for MemoryTransaction {
    fn identity_row(&self, key: &str) -> Result<Option<IdentityRow>, StoreError> {
        if let Some(row) = self.staged.identity_rows.get(key) {
            return Ok(Some(row.clone()));
        }
        Ok(self.repo.state.read().identity_rows.get(key).cloned())
    }

    fn insert_identity_row(&mut self, row: IdentityRow) -> Result<IdentityRow, StoreError> {
        if let Some(existing) = self.identity_row(&row.key)? {
            return Ok(existing);
        }
        self.staged
            .identity_rows
            .insert(row.key.clone(), row.clone());
        Ok(row)
    }

    fn put_issue(&mut self, issue: IssueRow) -> Result<(), StoreError> {
        self.staged.issues.insert(issue.id, issue);
        Ok(())
    }

    fn issue(&self, id: &InvestigationId) -> Result<Option<IssueRow>, StoreError> {
        if let Some(issue) = self.staged.issues.get(id) {
            return Ok(Some(issue.clone()));
        }
        Ok(self.repo.state.read().issues.get(id).cloned())
    }

    fn link_issue(&mut self, id: &InvestigationId, identity_key: &str) -> Result<(), StoreError> {
        self.staged
            .links
            .entry(*id)
            .or_default()
            .insert(identity_key.to_string());
        Ok(())
    }

    fn issue_links(&self, id: &InvestigationId) -> Result<Vec<IdentityRow>, StoreError> {
        self.merged_links(id)
            .into_iter()
            .map(|key| {
                self.identity_row(&key)?.ok_or(StoreError::NotFound {
                    what: "identity row",
                    id: key,
                })
            })
            .collect()
    }

    fn issues_for_identity(&self, identity_key: &str) -> Result<Vec<IssueRow>, StoreError> {
        let mut ids: BTreeSet<InvestigationId> = {
            let state = self.repo.state.read();
            state
                .links
                .iter()
                .filter(|(_, keys)| keys.contains(identity_key))
                .map(|(id, _)| *id)
                .collect()
        };
        ids.extend(
            self.staged
                .links
                .iter()
                .filter(|(_, keys)| keys.contains(identity_key))
                .map(|(id, _)| *id),
        );
        let mut issues = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(issue) = self.issue(&id)? {
                issues.push(issue);
            }
        }
        issues.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(issues)
    }

    fn list_issues(&self) -> Result<Vec<IssueRow>, StoreError> {
        let mut merged: BTreeMap<InvestigationId, IssueRow> =
            self.repo.state.read().issues.clone();
        for (id, issue) in &self.staged.issues {
            merged.insert(*id, issue.clone());
        }
        let mut issues: Vec<IssueRow> = merged.into_values().collect();
        issues.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(issues)
    }

    fn put_document_if_absent(
        &mut self,
        digest: &ContentDigest,
        document: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let key = digest.to_string();
        if self.staged.documents.contains_key(&key)
            || self.repo.state.read().documents.contains_key(&key)
        {
            return Ok(false);
        }
        self.staged.documents.insert(key, document);
        Ok(true)
    }

    fn document(&self, digest: &ContentDigest) -> Result<Option<serde_json::Value>, StoreError> {
        let key = digest.to_string();
        if let Some(doc) = self.staged.documents.get(&key) {
            return Ok(Some(doc.clone()));
        }
        Ok(self.repo.state.read().documents.get(&key).cloned())
    }
}

impl Transaction for MemoryTransaction {
    fn commit(mut self) -> Result<CommitSummary, StoreError> {
        self.finished = true;
        if self.repo.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::CommitFailed(
                "store is refusing commits".to_string(),
            ));
        }

        let staged = std::mem::take(&mut self.staged);
        let mut summary = CommitSummary::default();
        let mut state = self.repo.state.write();

        for ((kind, key), record) in staged.records {
            match record {
                Some(record) => {
                    state.records.entry(kind).or_default().insert(key, record);
                    summary.records_written += 1;
                }
                None => {
                    if let Some(by_kind) = state.records.get_mut(&kind) {
                        if by_kind.remove(&key).is_some() {
                            summary.records_deleted += 1;
                        }
                    }
                }
            }
        }
        summary.registrations_written = staged.registrations.len();
        state.registrations.extend(staged.registrations);
        state.overrides.extend(staged.overrides);
        for (key, row) in staged.identity_rows {
            state.identity_rows.entry(key).or_insert(row);
        }
        summary.issues_written = staged.issues.len();
        state.issues.extend(staged.issues);
        for (id, keys) in staged.links {
            state.links.entry(id).or_default().extend(keys);
        }
        for (key, doc) in staged.documents {
            if !state.documents.contains_key(&key) {
                state.documents.insert(key, doc);
                summary.documents_stored += 1;
            }
        }

        tracing::debug!(
            records_written = summary.records_written,
            records_deleted = summary.records_deleted,
            issues_written = summary.issues_written,
            "transaction committed"
        );
        Ok(summary)
    }

    fn rollback(mut self) {
        self.finished = true;
        tracing::debug!("transaction rolled back");
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.staged.is_empty() {
            tracing::debug!("transaction dropped without commit; staged writes discarded");
        }
    }
}
