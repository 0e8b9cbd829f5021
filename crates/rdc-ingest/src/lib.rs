//! # rdc-ingest — Submission Orchestrator
//!
//! Drives one parsed submission through validation, identity resolution,
//! quarantine or merge, and commit. The identity engine, investigation
//! service and merge engine all operate on the one transaction this crate
//! opens per submission, so a submission is either fully applied or not at
//! all.
//!
//! ## Concurrency
//!
//! [`Ingestor`] is `Sync` when its store is: submissions may be ingested
//! from many threads. Submissions sharing an identifier are serialized by
//! [`IdentityLocks`]; unrelated submissions proceed in parallel.
//!
//! ## Metrics
//!
//! - `rdc_ingest_documents_total{outcome}` — merged, quarantined, rejected, failed.
//! - `rdc_merge_records_total{status}` — records per delta status.

pub mod config;
pub mod error;
pub mod ingestor;
pub mod locks;

pub use config::{ConfigError, IngestConfig};
pub use error::IngestError;
pub use ingestor::{IngestOutcome, Ingestor};
pub use locks::IdentityLocks;
