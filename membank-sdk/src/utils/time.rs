//! Time Utilities

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339, naive date-times (taken as UTC) and plain dates.
/// Empty or unparseable input yields `None`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Age in fractional days. Future timestamps have age 0.
pub fn age_in_days(timestamp: &DateTime<Utc>, now: &DateTime<Utc>) -> f64 {
    let seconds = now.signed_duration_since(*timestamp).num_seconds().max(0);
    seconds as f64 / 86_400.0
}
