//! # rdc-identity — Identity Resolution
//!
//! Attributes each validated submission to a feed-scoped pid and a
//! cross-feed person id, or declines to and opens an investigation.
//!
//! - [`IdentityResolver::resolve`] matches within the submitting feed.
//! - [`IdentityResolver::resolve_across_store`] searches other feeds for the
//!   person behind a new pid.
//! - The registry operations register and refresh pids and administer
//!   person membership (merge, split, match overrides).
//!
//! All operations run inside the caller's transaction and never commit.

pub mod config;
pub mod cross_feed;
pub mod error;
pub mod registry;
pub mod resolver;

pub use config::IdentityConfig;
pub use cross_feed::CrossFeedResolution;
pub use error::IdentityError;
pub use registry::adds_identifiers;
pub use resolver::{IdentityResolver, Resolution};
