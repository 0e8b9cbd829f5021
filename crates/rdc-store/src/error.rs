//! # Store Errors
//!
//! Infrastructure failures of the repository. These propagate to the caller;
//! a failed commit leaves no partial state behind.

use thiserror::Error;

/// Errors raised by a repository.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The commit could not be applied. Nothing from the transaction was persisted.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// A row the operation depends on does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Kind of row (e.g. "investigation", "registration").
        what: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A write would violate a uniqueness constraint.
    #[error("uniqueness violation on {what}: {key}")]
    Conflict {
        /// Kind of row.
        what: &'static str,
        /// The conflicting key.
        key: String,
    },

    /// Snapshot serialization failed.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot I/O failed.
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound {
            what: "registration",
            id: "1000000001".into(),
        };
        assert_eq!(err.to_string(), "registration not found: 1000000001");
    }
}
