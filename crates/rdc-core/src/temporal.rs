//! # Temporal Types
//!
//! Two kinds of time flow through the stack:
//!
//! - **Clinical timestamps** arrive timezone-aware in submissions and are
//!   persisted timezone-naive in one fixed [`ReferenceZone`]. Comparing an
//!   incoming value against a persisted one localizes the persisted value in
//!   the reference zone first, so a resend that only changes the offset
//!   notation of the same instant does not flag the record as modified.
//!
//! - **Bookkeeping timestamps** (record creation/modification, investigation
//!   creation) are [`Timestamp`]s: UTC, truncated to seconds.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RdcError;

/// The fixed zone persisted clinical timestamps are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    offset: FixedOffset,
}

impl ReferenceZone {
    /// The UTC reference zone.
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// A reference zone `secs` seconds east of UTC.
    ///
    /// # Errors
    ///
    /// Returns `RdcError::Temporal` if the offset is outside ±24h.
    pub fn from_offset_secs(secs: i32) -> Result<Self, RdcError> {
        FixedOffset::east_opt(secs)
            .map(|offset| Self { offset })
            .ok_or_else(|| RdcError::Temporal(format!("UTC offset out of range: {secs}s")))
    }

    /// The underlying offset.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Convert an incoming timezone-aware instant to its persisted naive form.
    pub fn to_stored(&self, incoming: &DateTime<FixedOffset>) -> NaiveDateTime {
        incoming.with_timezone(&self.offset).naive_local()
    }

    /// Interpret a persisted naive timestamp as an instant in the reference zone.
    pub fn localize(&self, stored: &NaiveDateTime) -> DateTime<FixedOffset> {
        let utc = *stored - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, self.offset)
    }

    /// Whether a persisted naive timestamp denotes the same instant as an
    /// incoming timezone-aware one.
    pub fn same_instant(&self, stored: &NaiveDateTime, incoming: &DateTime<FixedOffset>) -> bool {
        self.localize(stored) == *incoming
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::utc()
    }
}

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 timestamp with any offset, normalizing to UTC.
    pub fn parse(s: &str) -> Result<Self, RdcError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| RdcError::Temporal(format!("invalid RFC 3339 timestamp {s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn utc_zone() -> ReferenceZone {
        ReferenceZone::utc()
    }

    fn bst() -> ReferenceZone {
        ReferenceZone::from_offset_secs(3600).unwrap()
    }

    #[test]
    fn stored_form_is_reference_local() {
        let incoming = DateTime::parse_from_rfc3339("2026-06-01T12:00:00+02:00").unwrap();
        let stored = bst().to_stored(&incoming);
        assert_eq!(
            stored,
            NaiveDate::from_ymd_opt(2026, 6, 1)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn same_instant_across_offsets() {
        let zone = utc_zone();
        let stored = NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let as_utc = DateTime::parse_from_rfc3339("2026-01-15T09:30:00Z").unwrap();
        let as_cet = DateTime::parse_from_rfc3339("2026-01-15T10:30:00+01:00").unwrap();
        assert!(zone.same_instant(&stored, &as_utc));
        assert!(zone.same_instant(&stored, &as_cet));
    }

    #[test]
    fn different_instant_detected() {
        let zone = bst();
        let stored = NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        // Naive comparison would call these equal; the instants differ by an hour.
        let incoming = DateTime::parse_from_rfc3339("2026-01-15T09:30:00Z").unwrap();
        assert!(!zone.same_instant(&stored, &incoming));
    }

    #[test]
    fn round_trip_through_storage() {
        let zone = bst();
        let incoming = DateTime::parse_from_rfc3339("2026-03-29T00:59:59-05:00").unwrap();
        assert!(zone.same_instant(&zone.to_stored(&incoming), &incoming));
    }

    #[test]
    fn offset_out_of_range_rejected() {
        assert!(ReferenceZone::from_offset_secs(90_000).is_err());
    }

    #[test]
    fn timestamp_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(123_456_789).unwrap());
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn timestamp_parse_normalizes_offset() {
        let ts = Timestamp::parse("2026-01-15T17:00:00+05:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
        assert!(Timestamp::parse("not a date").is_err());
    }
}
