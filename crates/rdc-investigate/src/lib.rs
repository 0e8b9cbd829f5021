//! # rdc-investigate — Data-Quality Investigations
//!
//! When identity resolution cannot safely attribute a submission to a patient
//! it opens an investigation instead of guessing. An investigation names the
//! catalogued issue type, links the identities involved and keeps a
//! content-addressed snapshot of the submission that raised it.
//!
//! A blocking, unresolved investigation linked to a pid holds back every
//! later submission for that pid until it is resolved.

pub mod catalogue;
pub mod error;
pub mod investigation;
pub mod service;

pub use catalogue::{FailureClass, IssueType};
pub use error::InvestigationError;
pub use investigation::Investigation;
pub use service::{InvestigationConfig, Investigations};
