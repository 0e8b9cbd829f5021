//! Ingest errors.
//!
//! A submission that is quarantined behind an investigation is a successful
//! ingest ([`crate::IngestOutcome::Quarantined`]), not an error. Errors are
//! malformed submissions and infrastructure failures; on any of them the
//! transaction has been rolled back.

use rdc_core::InvestigationId;
use rdc_identity::IdentityError;
use rdc_investigate::InvestigationError;
use rdc_merge::MergeError;
use rdc_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The submission lacks identifying data and was never matched.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Repository failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity resolution failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Investigation bookkeeping failed.
    #[error(transparent)]
    Investigation(#[from] InvestigationError),

    /// The merge engine failed.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// A document could not be converted to or from its stored form.
    #[error("document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reprocessing was requested for an investigation with no document.
    #[error("investigation {0} has no attached document")]
    NoDocument(InvestigationId),
}

impl IngestError {
    /// Metric label for the failure.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            _ => "failed",
        }
    }
}
