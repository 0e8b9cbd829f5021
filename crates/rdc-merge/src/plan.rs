//! # Merge Plan
//!
//! The output of mapping one submission: an arena of mapped records keyed by
//! `(kind, key)`, each carrying explicit lists of its children's keys per
//! collection, plus the records the submission deletes. Nothing points back
//! at its parent; walking the tree means following child-key lists from the
//! root.
//!
//! A plan is inert until [`MergePlan::stage`] writes it into a transaction.

use std::collections::BTreeMap;

use rdc_core::{NaturalKey, Pid};
use rdc_store::{Record, RecordRepository};
use serde::Serialize;

use crate::error::MergeError;

/// Change status of a record in one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// First sight of the key.
    New,
    /// A column differs, or (aggregated) something in the subtree changed.
    Modified,
    /// Nothing differs.
    Unchanged,
    /// Previously persisted and absent from the submission.
    Deleted,
}

impl RecordStatus {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a record: natural keys are unique per kind only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordRef {
    /// Entity kind.
    pub kind: String,
    /// Natural key.
    pub key: NaturalKey,
}

impl RecordRef {
    /// Create a reference.
    pub fn new(kind: &str, key: NaturalKey) -> Self {
        Self {
            kind: kind.to_string(),
            key,
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.key)
    }
}

/// The children one collection mapped, and what it deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildKeys {
    /// Collection name.
    pub collection: String,
    /// Entity kind of the items.
    pub kind: String,
    /// Keys mapped, in document order.
    pub keys: Vec<NaturalKey>,
    /// Records deleted from this collection, followed by their descendants.
    pub deleted: Vec<RecordRef>,
}

/// One record as mapped from the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedRecord {
    /// The record as it will be persisted.
    pub record: Record,
    /// Status of the record's own columns.
    pub status: RecordStatus,
    /// Status including the subtree.
    pub aggregate: RecordStatus,
    /// Child collections in descriptor order.
    pub children: Vec<ChildKeys>,
}

impl MappedRecord {
    /// Whether the record itself must be written.
    pub fn needs_write(&self) -> bool {
        matches!(self.status, RecordStatus::New | RecordStatus::Modified)
    }
}

/// A non-fatal oddity found while mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum MergeWarning {
    /// Two items of a submission derived the same key; the later was skipped.
    DuplicateKey {
        /// Entity kind.
        kind: String,
        /// The shared key.
        key: NaturalKey,
    },
    /// A mandatory leaf was absent; the column was cleared.
    MissingMandatory {
        /// Entity kind.
        kind: String,
        /// Record key.
        key: NaturalKey,
        /// The leaf.
        field: String,
    },
    /// A singleton collection held more than one item; only the first was
    /// mapped.
    SingletonOverflow {
        /// Entity kind.
        kind: String,
        /// Parent key.
        parent: NaturalKey,
        /// Items received.
        count: usize,
    },
}

impl std::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { kind, key } => {
                write!(f, "duplicate {kind} key {key}; later item skipped")
            }
            Self::MissingMandatory { kind, key, field } => {
                write!(f, "{kind} {key} has no {field}")
            }
            Self::SingletonOverflow {
                kind,
                parent,
                count,
            } => write!(f, "{count} {kind} items under {parent}; only the first kept"),
        }
    }
}

/// Record counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaCounts {
    /// New records.
    pub new: usize,
    /// Modified records.
    pub modified: usize,
    /// Unchanged records.
    pub unchanged: usize,
    /// Deleted records.
    pub deleted: usize,
}

impl std::fmt::Display for DeltaCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "new={} modified={} unchanged={} deleted={}",
            self.new, self.modified, self.unchanged, self.deleted
        )
    }
}

/// Records of a subtree grouped by aggregated status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deltas {
    /// New records.
    pub new: Vec<RecordRef>,
    /// Modified records, including unchanged records whose subtree changed.
    pub modified: Vec<RecordRef>,
    /// Unchanged records.
    pub unchanged: Vec<RecordRef>,
    /// Deleted records, including cascaded descendants.
    pub deleted: Vec<RecordRef>,
}

impl Deltas {
    /// Counts per status.
    pub fn counts(&self) -> DeltaCounts {
        DeltaCounts {
            new: self.new.len(),
            modified: self.modified.len(),
            unchanged: self.unchanged.len(),
            deleted: self.deleted.len(),
        }
    }

    /// Records with the given status.
    pub fn of(&self, status: RecordStatus) -> &[RecordRef] {
        match status {
            RecordStatus::New => &self.new,
            RecordStatus::Modified => &self.modified,
            RecordStatus::Unchanged => &self.unchanged,
            RecordStatus::Deleted => &self.deleted,
        }
    }

    /// Whether the submission changed nothing.
    pub fn is_noop(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    fn push(&mut self, status: RecordStatus, r: RecordRef) {
        match status {
            RecordStatus::New => self.new.push(r),
            RecordStatus::Modified => self.modified.push(r),
            RecordStatus::Unchanged => self.unchanged.push(r),
            RecordStatus::Deleted => self.deleted.push(r),
        }
    }
}

/// Writes a plan staged into a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    /// Records added or replaced.
    pub written: usize,
    /// Records deleted.
    pub deleted: usize,
}

/// The mapped form of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pid: Pid,
    root: RecordRef,
    records: BTreeMap<RecordRef, MappedRecord>,
    warnings: Vec<MergeWarning>,
}

impl MergePlan {
    pub(crate) fn new(
        pid: Pid,
        root: RecordRef,
        records: BTreeMap<RecordRef, MappedRecord>,
        warnings: Vec<MergeWarning>,
    ) -> Self {
        Self {
            pid,
            root,
            records,
            warnings,
        }
    }

    /// The pid the plan belongs to.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// The patient root.
    pub fn root(&self) -> &RecordRef {
        &self.root
    }

    /// A mapped record.
    pub fn get(&self, kind: &str, key: &NaturalKey) -> Option<&MappedRecord> {
        self.records.get(&RecordRef::new(kind, key.clone()))
    }

    /// Every mapped record, ordered by `(kind, key)`.
    pub fn records(&self) -> impl Iterator<Item = (&RecordRef, &MappedRecord)> {
        self.records.iter()
    }

    /// Number of mapped records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was mapped.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Warnings raised while mapping.
    pub fn warnings(&self) -> &[MergeWarning] {
        &self.warnings
    }

    /// Deltas of the subtree rooted at `at`, in depth-first document order.
    pub fn get_deltas(&self, at: &RecordRef) -> Deltas {
        let mut deltas = Deltas::default();
        self.collect(at, &mut deltas);
        deltas
    }

    /// Deltas of the whole submission.
    pub fn deltas(&self) -> Deltas {
        self.get_deltas(&self.root)
    }

    fn collect(&self, at: &RecordRef, deltas: &mut Deltas) {
        let Some(mapped) = self.records.get(at) else {
            return;
        };
        deltas.push(mapped.aggregate, at.clone());
        for child in &mapped.children {
            for key in &child.keys {
                self.collect(&RecordRef::new(&child.kind, key.clone()), deltas);
            }
            deltas.deleted.extend(child.deleted.iter().cloned());
        }
    }

    /// Every record the plan deletes.
    pub fn deletions(&self) -> Vec<RecordRef> {
        self.deltas().deleted
    }

    /// Write the plan into a transaction: new and modified records are
    /// added, deleted records removed.
    pub fn stage<R>(&self, repo: &mut R) -> Result<StageSummary, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let mut summary = StageSummary::default();
        for mapped in self.records.values().filter(|m| m.needs_write()) {
            repo.add(mapped.record.clone())?;
            summary.written += 1;
        }
        for doomed in self.deletions() {
            repo.delete(&doomed.kind, &doomed.key)?;
            summary.deleted += 1;
        }
        tracing::debug!(
            pid = %self.pid,
            written = summary.written,
            deleted = summary.deleted,
            "merge plan staged"
        );
        Ok(summary)
    }
}
