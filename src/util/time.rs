//! Human time and duration parsing for search filters.
//!
//! Accepts the vocabulary people actually type at a prompt: "1 hour ago",
//! "yesterday", "2026-01-31", an RFC 3339 stamp, or for durations
//! "90 seconds" / "1.5h"-style `humantime` strings. Unparseable input is
//! reported as `None`; the caller keeps the raw value so a bad filter
//! degrades to an empty result instead of an error (query-parse policy).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Timestamp format used everywhere in the store.
pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC timestamp the way the store writes it.
#[must_use]
pub fn to_sql_timestamp(t: &DateTime<Utc>) -> String {
    t.format(SQL_TIMESTAMP_FORMAT).to_string()
}

/// Convert POSIX seconds to a UTC timestamp string for the store.
#[must_use]
pub fn posix_to_sql_timestamp(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|t| to_sql_timestamp(&t))
}

/// Parse a human datetime string into UTC.
///
/// Supported forms: "now", "today", "yesterday", "<duration> ago",
/// RFC 3339, `%Y-%m-%d %H:%M:%S`, and `%Y-%m-%d`.
#[must_use]
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    parse_datetime_at(input, Utc::now())
}

fn parse_datetime_at(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = input.trim();
    match s.to_lowercase().as_str() {
        "now" => return Some(now),
        "today" => {
            return now.date_naive().and_hms_opt(0, 0, 0).map(|t| Utc.from_utc_datetime(&t));
        }
        "yesterday" => {
            return (now - Duration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|t| Utc.from_utc_datetime(&t));
        }
        _ => {}
    }

    if let Some(ago) = s.strip_suffix("ago") {
        let dur = parse_duration(ago.trim())?;
        return Some(now - Duration::seconds(dur));
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, SQL_TIMESTAMP_FORMAT) {
        return Some(Utc.from_utc_datetime(&t));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| Utc.from_utc_datetime(&t));
    }
    None
}

/// Parse a human duration string into whole seconds.
///
/// `humantime` does the heavy lifting; spaces between the number and the
/// unit are tolerated ("7 days" == "7days").
#[must_use]
pub fn parse_duration(input: &str) -> Option<i64> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    humantime::parse_duration(&compact)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
}
