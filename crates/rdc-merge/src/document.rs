//! # Document Node Tree
//!
//! The typed, hierarchical form a parsed submission takes on its way into
//! the merge engine. A [`Node`] holds named leaves and named child
//! collections; a [`Collection`] holds its items in document order and, for
//! time-windowed data, the window the sender vouches is complete.
//!
//! The tree is serde-serializable so a quarantined submission can be stored
//! and reprocessed later.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use rdc_core::{CodedValue, SubmissionHeader};
use serde::{Deserialize, Serialize};

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Leaf {
    /// Free text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Decimal in normalized string form; see [`Leaf::decimal`].
    Decimal(String),
    /// Boolean flag.
    Bool(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Timezone-aware datetime.
    DateTime(DateTime<FixedOffset>),
    /// Coded value.
    Coded(CodedValue),
}

impl Leaf {
    /// A text leaf.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// A decimal leaf, normalized so that `"1.50"`, `"+1.5"` and `"1.5"`
    /// compare equal. Input that is not a plain decimal is kept as given.
    pub fn decimal(value: &str) -> Self {
        Self::Decimal(normalize_decimal(value))
    }

    /// A coded leaf.
    pub fn coded(code: &str, standard: &str, description: &str) -> Self {
        Self::Coded(CodedValue::new(code, standard, description))
    }

    /// The leaf as an identifier component: text and integers only.
    pub fn as_key_component(&self) -> Option<String> {
        match self {
            Self::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Coded(c) if !c.code.trim().is_empty() => Some(c.code.trim().to_string()),
            _ => None,
        }
    }
}

/// Canonical string form of a decimal.
pub fn normalize_decimal(raw: &str) -> String {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let well_formed = !digits.is_empty()
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().any(|c| c.is_ascii_digit());
    if !well_formed {
        return trimmed.to_string();
    }

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    let int_part = if int_part.is_empty() { "0" } else { int_part };

    let mut out = String::with_capacity(trimmed.len());
    if negative && !(int_part == "0" && frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// The time range a windowed collection is complete for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Start of the window (exclusive).
    pub start: DateTime<FixedOffset>,
    /// End of the window (exclusive).
    pub stop: DateTime<FixedOffset>,
}

impl Window {
    /// Create a window.
    pub fn new(start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>) -> Self {
        Self { start, stop }
    }

    /// Whether `instant` lies strictly inside the window.
    pub fn strictly_contains(&self, instant: &DateTime<FixedOffset>) -> bool {
        self.start < *instant && *instant < self.stop
    }
}

/// An ordered collection of child nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Items in document order.
    #[serde(default)]
    pub items: Vec<Node>,
    /// Completeness window, for time-windowed collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
}

impl Collection {
    /// A collection of `items` with no window.
    pub fn of(items: Vec<Node>) -> Self {
        Self {
            items,
            window: None,
        }
    }

    /// A collection of `items` complete for `window`.
    pub fn windowed(items: Vec<Node>, window: Window) -> Self {
        Self {
            items,
            window: Some(window),
        }
    }
}

/// One entity in a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Scalar and coded leaves by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Leaf>,
    /// Child collections by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, Collection>,
}

impl Node {
    /// An empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a leaf.
    pub fn with(mut self, name: &str, leaf: Leaf) -> Self {
        self.fields.insert(name.to_string(), leaf);
        self
    }

    /// Set a child collection.
    pub fn with_collection(mut self, name: &str, collection: Collection) -> Self {
        self.collections.insert(name.to_string(), collection);
        self
    }

    /// Read a leaf.
    pub fn field(&self, name: &str) -> Option<&Leaf> {
        self.fields.get(name)
    }

    /// Read a child collection.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }
}

/// A parsed submission: identifying header plus the patient tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingDocument {
    /// Identifying metadata.
    pub header: SubmissionHeader,
    /// Root of the patient tree.
    pub patient: Node,
}
