//! Timestamp utilities

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};

/// Get current UTC timestamp, truncated to the stored (microsecond) precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Whole calendar days from `moment` to `today` (UTC)
///
/// Time of day is discarded before subtracting, so an inspection taken at
/// 23:59 one day is exactly one day old at 00:00 the next.
pub fn calendar_days_since(moment: DateTime<Utc>, today: NaiveDate) -> i64 {
    (today - moment.date_naive()).num_days()
}

/// Format a timestamp for storage
///
/// Fixed-width microsecond precision so stored values sort lexically in
/// chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 column value
pub fn parse_timestamp(column: &str, value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
