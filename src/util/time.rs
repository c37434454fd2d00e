// FlashBatch - util/time.rs
//
// Wall-clock helpers. Every timestamp in the data model is Unix epoch
// milliseconds, matching what the flashing engine reports.

use chrono::{Local, TimeZone, Utc};

/// Source of "now" in epoch milliseconds.
///
/// Components take a `Clock` so tests can pin time.
pub type Clock = fn() -> u64;

/// Current time in epoch milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Local wall-clock time of day, used to prefix log buffer lines.
pub fn local_time_of_day() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Render an epoch-millisecond timestamp as local `YYYY-MM-DD HH:MM:SS`.
///
/// Out-of-range values render as the raw number rather than panicking.
pub fn format_local(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Render an epoch-millisecond timestamp as RFC 3339 UTC.
pub fn format_rfc3339(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_rfc3339_epoch() {
        assert_eq!(format_rfc3339(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_out_of_range_falls_back_to_number() {
        assert_eq!(format_rfc3339(u64::MAX), u64::MAX.to_string());
    }
}
