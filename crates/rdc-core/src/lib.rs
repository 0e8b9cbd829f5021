//! # rdc-core — Foundational Types for Submission Reconciliation
//!
//! Leaf crate of the `rdc-*` workspace. Every other crate depends on it; it
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtypes for identifiers.** `Pid`, `PersonId`, `InvestigationId` and
//!    `NaturalKey` are distinct types. A feed-scoped pid cannot be passed where
//!    a cross-feed person id is expected.
//!
//! 2. **Natural keys are derived, never invented.** `NaturalKey` constructors
//!    encode the persisted key formats (`{pid}:{seq}`, `{pid}:{placerId}`,
//!    `{orderKey}:{prePost}:{serviceId}:{seq}`, `{pid}`). Re-deriving a key
//!    from identical input reproduces the stored key.
//!
//! 3. **Coded values are atomic.** `CodedValue` carries code, coding standard
//!    and description together; there is no way to store one without the
//!    others.
//!
//! 4. **One reference zone.** Clinical timestamps arrive timezone-aware and are
//!    stored naive in a single `ReferenceZone`. Comparisons localize the stored
//!    value first.
//!
//! 5. **Digests flow through `CanonicalBytes`.** Document snapshots are hashed
//!    over JCS-canonical bytes with volatile fields removed.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod coded;
pub mod digest;
pub mod error;
pub mod identity;
pub mod key;
pub mod patient;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use coded::CodedValue;
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, KeyError, RdcError};
pub use identity::{
    FeedScope, Identifier, InvestigationId, MatchCandidate, PersonId, PersonIdentity, Pid,
};
pub use key::NaturalKey;
pub use patient::{PatientInfo, SubmissionHeader};
pub use temporal::{ReferenceZone, Timestamp};
