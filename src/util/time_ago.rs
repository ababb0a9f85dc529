//! Relative rendering of server timestamps.
//!
//! The server stamps messages with an offset-naive UTC string such as
//! `2024-01-01T00:00:00` (optionally with fractional seconds). Appending a
//! `Z` marker makes it RFC 3339, which `time` parses directly.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Parse a naive server timestamp as UTC.
#[must_use]
pub fn parse_naive_utc(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    OffsetDateTime::parse(&format!("{raw}Z"), &Rfc3339).ok()
}

/// "N seconds/minutes/hours/days ago" relative to `now`.
///
/// Timestamps in the future count as 0 seconds ago. Anything that does not
/// parse is returned unchanged.
#[must_use]
pub fn time_ago(raw: &str, now: OffsetDateTime) -> String {
    let Some(at) = parse_naive_utc(raw) else {
        return raw.to_owned();
    };
    let elapsed = (now - at).whole_seconds().max(0);
    let (count, unit) = if elapsed < MINUTE {
        (elapsed, "second")
    } else if elapsed < HOUR {
        (elapsed / MINUTE, "minute")
    } else if elapsed < DAY {
        (elapsed / HOUR, "hour")
    } else {
        (elapsed / DAY, "day")
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

#[cfg(test)]
#[path = "time_ago_test.rs"]
mod tests;
