//! # Persisted Records
//!
//! A [`Record`] is the generic persisted form of every mapped entity: a kind,
//! a natural key, the key of the parent record, bookkeeping timestamps, and a
//! column map. A column that is absent from the map is null.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rdc_core::{NaturalKey, Pid, Timestamp};
use serde::{Deserialize, Serialize};

/// A persisted column value.
///
/// Datetimes are stored naive in the reference zone; see
/// [`rdc_core::ReferenceZone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text.
    Text(String),
    /// Integer.
    Integer(i64),
    /// Decimal, kept in its normalized string form.
    Decimal(String),
    /// Boolean flag.
    Bool(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Reference-zone local datetime.
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// The text value, if this is a text column.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The datetime value, if this is a datetime column.
    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) | Self::Decimal(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Entity kind (e.g. "patient", "lab_order").
    pub kind: String,
    /// Natural key, unique within the kind.
    pub key: NaturalKey,
    /// Natural key of the parent record; `None` for a patient root.
    pub parent: Option<NaturalKey>,
    /// The pid whose tree this record belongs to.
    pub pid: Pid,
    /// When the key was first seen. Never changes after creation.
    pub created_at: Timestamp,
    /// When a column value last changed.
    pub updated_at: Timestamp,
    /// Column values; absent columns are null.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create an empty record first seen at `now`.
    pub fn new(
        kind: impl Into<String>,
        key: NaturalKey,
        parent: Option<NaturalKey>,
        pid: Pid,
        now: Timestamp,
    ) -> Self {
        Self {
            kind: kind.into(),
            key,
            parent,
            pid,
            created_at: now,
            updated_at: now,
            fields: BTreeMap::new(),
        }
    }

    /// Read a column.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Write or clear a column. Returns whether the stored value changed.
    pub fn set(&mut self, column: &str, value: Option<FieldValue>) -> bool {
        match value {
            Some(v) => {
                if self.fields.get(column) == Some(&v) {
                    false
                } else {
                    self.fields.insert(column.to_string(), v);
                    true
                }
            }
            None => self.fields.remove(column).is_some(),
        }
    }
}
