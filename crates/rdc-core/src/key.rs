//! # Natural Keys
//!
//! A natural key is derived from a record's position in the document tree or
//! from business identifiers it carries. It is never a surrogate: recomputing
//! it from identical input yields the stored key, which is what makes repeated
//! submissions merge instead of duplicate.
//!
//! ## Formats
//!
//! These must be reproduced exactly for compatibility with existing stores:
//!
//! | Record | Format |
//! |---|---|
//! | generic child | `{parent}:{seq}` (`{pid}:{seq}` directly under a patient) |
//! | order | `{pid}:{placerId}` |
//! | order line item | `{orderKey}:{prePostFlagOrEmpty}:{serviceId}:{seq}` |
//! | singleton child | `{parent}` (`{pid}` for a patient's registered doctor) |

use serde::{Deserialize, Serialize};

use crate::error::KeyError;
use crate::identity::Pid;

/// A deterministic record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    /// Key of the root record of a patient: the pid itself.
    pub fn root(pid: &Pid) -> Self {
        Self(pid.as_str().to_string())
    }

    /// Generic positional child key: `{parent}:{seq}`.
    pub fn child(parent: &NaturalKey, seq: usize) -> Self {
        Self(format!("{}:{seq}", parent.0))
    }

    /// Singleton child key: identical to the parent key.
    pub fn singleton(parent: &NaturalKey) -> Self {
        parent.clone()
    }

    /// Order key: `{pid}:{placerId}`.
    pub fn order(pid: &Pid, placer_id: &str) -> Result<Self, KeyError> {
        let placer_id = placer_id.trim();
        if placer_id.is_empty() {
            return Err(KeyError::EmptyComponent {
                component: "placer_id",
            });
        }
        Ok(Self(format!("{}:{placer_id}", pid.as_str())))
    }

    /// Order line-item key: `{orderKey}:{prePostFlagOrEmpty}:{serviceId}:{seq}`.
    pub fn order_item(
        order: &NaturalKey,
        pre_post: Option<&str>,
        service_id: &str,
        seq: usize,
    ) -> Self {
        Self(format!(
            "{}:{}:{service_id}:{seq}",
            order.0,
            pre_post.unwrap_or("")
        ))
    }

    /// Wrap a key read back from storage.
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Access the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
