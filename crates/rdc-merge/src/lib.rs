//! # rdc-merge — Hierarchical Merge Engine
//!
//! Maps an arbitrarily deep submission tree onto the records already
//! persisted for a pid and computes the minimal set of additions,
//! modifications and deletions.
//!
//! ## Design
//!
//! - **One mapper, many descriptors.** Entity types differ only in their
//!   [`EntityDescriptor`]: key rule, field table, child collections.
//! - **Explicit arena.** A [`MergePlan`] stores every mapped record in a flat
//!   map keyed by `(kind, key)` with explicit child-key lists.
//! - **Explicit repository handle.** The merger reads through the
//!   transaction it is given and never commits; [`MergePlan::stage`] writes
//!   the plan into the same transaction.
//! - **Deletion policy as data.** Each child collection is full-delete,
//!   time-windowed or never-delete; configuration may override it per kind.

pub mod clinical;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod mapper;
pub mod plan;

pub use clinical::clinical_catalogue;
pub use descriptor::{
    Cardinality, Catalogue, ChildSpec, CodedFieldSpec, DeletionPolicy, EntityDescriptor, FieldSpec,
    KeyRule,
};
pub use document::{normalize_decimal, Collection, IncomingDocument, Leaf, Node, Window};
pub use error::MergeError;
pub use mapper::Merger;
pub use plan::{
    ChildKeys, DeltaCounts, Deltas, MappedRecord, MergePlan, MergeWarning, RecordRef, RecordStatus,
    StageSummary,
};
