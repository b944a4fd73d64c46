use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage-assigned flashcard identifier, stable for the card's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl CardId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CardId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Owning user. Cards are never shared across owners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Last year `format_ts` renders with four digits.
pub const MAX_STORABLE_YEAR: i32 = 9999;

/// Whether `format_ts` renders `ts` as fixed-width RFC3339.
///
/// Outside years 0..=9999 chrono emits a signed, wider year (`+23236-...`)
/// that `parse_ts` rejects and that no longer sorts chronologically.
pub fn is_storable(ts: DateTime<Utc>) -> bool {
    (0..=MAX_STORABLE_YEAR).contains(&ts.year())
}

/// Fixed-width RFC3339 rendering (`2024-01-01T00:00:00.000Z`).
///
/// Every persisted timestamp goes through this so that lexicographic order
/// in SQLite matches chronological order. Only holds for [`is_storable`]
/// timestamps.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp with any offset into UTC.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn storable_range_ends_at_year_9999() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(is_storable(last));
        assert_eq!(parse_ts(&format_ts(last)), Some(last));

        let beyond = last + Duration::days(1);
        assert!(!is_storable(beyond));
        assert!(parse_ts(&format_ts(beyond)).is_none());
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(format_ts(a), "2024-01-01T09:00:00.000Z");
        assert!(format_ts(a) < format_ts(b));
    }

    #[test]
    fn parse_normalises_offsets_to_utc() {
        let parsed = parse_ts("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(parse_ts("yesterday").is_none());
    }
}
