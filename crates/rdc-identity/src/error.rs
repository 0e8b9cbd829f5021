//! Error types for identity resolution and person administration.

use rdc_core::{PersonId, Pid};
use rdc_investigate::InvestigationError;
use rdc_store::StoreError;
use thiserror::Error;

/// Infrastructure failures during identity resolution.
///
/// Ambiguous, inconsistent or blocked matches are not errors; they come back
/// as `Resolution::Issue`.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Opening or linking an investigation failed.
    #[error(transparent)]
    Investigation(#[from] InvestigationError),

    /// A matching query returned a pid that has no registration.
    #[error("pid {0} has no registration")]
    UnknownPid(Pid),

    /// No registration carries the person id.
    #[error("person {0} has no registered pids")]
    UnknownPerson(PersonId),
}
