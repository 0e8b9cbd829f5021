//! Error types for the merge engine.

use rdc_core::KeyError;
use rdc_store::StoreError;
use thiserror::Error;

/// Failures that abort merging a whole submission.
#[derive(Error, Debug)]
pub enum MergeError {
    /// The repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A natural key could not be derived.
    #[error("natural key: {0}")]
    Key(#[from] KeyError),

    /// A child collection names an entity kind with no descriptor.
    #[error("no descriptor for entity kind {0:?}")]
    UnknownKind(String),

    /// A descriptor is internally inconsistent.
    #[error("invalid descriptor for {kind:?}: {reason}")]
    InvalidDescriptor {
        /// The entity kind.
        kind: String,
        /// What is wrong with it.
        reason: String,
    },
}
