//! Error types for the investigation subsystem.

use rdc_core::{CanonicalizationError, InvestigationId};
use rdc_store::StoreError;
use thiserror::Error;

/// Errors from opening, attaching to, or resolving investigations.
///
/// Data-quality findings are never errors: they are the investigations
/// themselves. These variants are infrastructure failures only.
#[derive(Error, Debug)]
pub enum InvestigationError {
    /// The repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The attached document could not be canonicalized for digesting.
    #[error("document canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A persisted investigation carries an id missing from the catalogue.
    #[error("unknown issue type id {0}")]
    UnknownIssueType(u32),

    /// No investigation exists with the given id.
    #[error("investigation {0} not found")]
    NotFound(InvestigationId),
}
