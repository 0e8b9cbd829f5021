//! # rdc-store — Repository Contract and In-Memory Store
//!
//! The reconciliation engines consume a generic keyed repository through the
//! traits in [`traits`]. The concrete persistence mechanics are outside this
//! workspace; [`MemoryRepository`] is a complete transactional implementation
//! used by the CLI (with JSON snapshot files) and by every test suite.
//!
//! ## Transactions
//!
//! One submission is one transaction. Every natural-key lookup, field
//! mutation, deletion and investigation staged while processing it is
//! committed atomically, or not at all.

pub mod error;
pub mod memory;
pub mod record;
pub mod rows;
pub mod snapshot;
pub mod traits;

pub use error::StoreError;
pub use memory::{MemoryRepository, MemoryTransaction, StoreState};
pub use record::{FieldValue, Record};
pub use rows::{
    AttachmentRef, IdentifierKind, IdentityRow, IssueRow, MatchOverride, PatientRegistration,
};
pub use traits::{
    CommitSummary, IdentityRepository, IssueRepository, RecordRepository, Repository, Transaction,
    TransactionalStore,
};
