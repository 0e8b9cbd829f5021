//! # Error Types
//!
//! Errors shared by every crate of the workspace. All errors use `thiserror`
//! for derive-based `Display` and `Error` implementations.
//!
//! Data-quality problems (ambiguous or inconsistent identity matches,
//! demographic mismatches, open blocking investigations) are NOT errors. They
//! are returned as investigation values by the identity engine. Only malformed
//! input and infrastructure failures appear here.

use thiserror::Error;

/// Top-level error type for the reconciliation stack.
#[derive(Error, Debug)]
pub enum RdcError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A natural key could not be derived.
    #[error("natural key error: {0}")]
    Key(#[from] KeyError),

    /// The document is malformed and was rejected before identity resolution.
    #[error("validation error: {0}")]
    Validation(String),

    /// A timestamp could not be parsed or normalized.
    #[error("temporal error: {0}")]
    Temporal(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// A volatile-field path is not a valid JSON pointer.
    #[error("invalid JSON pointer {0:?}: must be empty or start with '/'")]
    InvalidPointer(String),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error deriving a natural key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A key component that must be non-empty was empty.
    #[error("natural key component {component} is empty")]
    EmptyComponent {
        /// Which component was empty (e.g. "pid", "placer_id").
        component: &'static str,
    },

    /// A business-identifier key was requested but the identifying field is absent.
    #[error("business identifier field {field} is missing on {kind}")]
    MissingBusinessId {
        /// Entity kind being keyed.
        kind: String,
        /// The missing source field.
        field: String,
    },

    /// A key rule that needs a parent key was evaluated at the root.
    #[error("{kind} requires a parent key")]
    MissingParent {
        /// Entity kind being keyed.
        kind: String,
    },
}
