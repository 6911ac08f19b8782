//! Timestamp utilities.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// The format is `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
///
/// # Examples
///
/// ```
/// use chainflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Formats a timestamp the same way as [`iso_timestamp`].
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds elapsed since `started`, with sub-millisecond precision.
#[must_use]
pub fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_fixed() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-09T07:05:01.000000+00:00");
    }

    #[test]
    fn test_elapsed_ms_is_monotonic() {
        let started = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(elapsed_ms(started) >= 5.0);
    }

    #[test]
    fn test_now_utc_round_trips_through_rfc3339() {
        let now = now_utc();
        let parsed = DateTime::parse_from_rfc3339(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), now);
    }
}
