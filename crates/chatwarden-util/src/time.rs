//! Time utilities for chatwarden
//!
//! The usage tracker works on local calendar dates and wall-clock expiry
//! times, so everything here is expressed in `DateTime<Local>`.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `CHATWARDEN_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising day rollover and premium expiry by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! CHATWARDEN_MOCK_TIME="2025-12-31 23:59:00" chatwarden status
//! ```

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "CHATWARDEN_MOCK_TIME";

/// Format accepted by `CHATWARDEN_MOCK_TIME`
const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT)
            else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };

            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
///
/// In release builds, this always returns the real system time.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a stored calendar date (`YYYY-MM-DD`).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (what chatwarden writes) as well as naive ISO-8601
/// local times with optional fractional seconds, which older usage files
/// contain. Naive times are interpreted in the local timezone; ambiguous
/// times during a DST fold resolve to the earlier instant.
pub fn parse_local_timestamp(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    Local.from_local_datetime(&naive).earliest()
}

/// Whole days from `now` until `until`, rounded toward negative infinity.
///
/// 29 days and 23 hours is 29 days; one hour in the past is -1.
pub fn whole_days_until(until: &DateTime<Local>, now: &DateTime<Local>) -> i64 {
    let secs = until.signed_duration_since(*now).num_seconds();
    secs.div_euclid(86_400)
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 || d.subsec_millis() == 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", d.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-01-31"), NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(parse_date(" 2025-01-31 "), NaiveDate::from_ymd_opt(2025, 1, 31));
        assert!(parse_date("2025-02-30").is_none());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let dt = Local.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let parsed = parse_local_timestamp(&dt.to_rfc3339()).unwrap();
        assert_eq!(parsed, dt);
    }

    #[test]
    fn test_parse_naive_iso_timestamp() {
        let expected = Local.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_local_timestamp("2025-06-01T08:00:00"), Some(expected));

        let with_micros = parse_local_timestamp("2025-06-01T08:00:00.123456").unwrap();
        assert_eq!(with_micros.timestamp(), expected.timestamp());

        assert!(parse_local_timestamp("not a timestamp").is_none());
        assert!(parse_local_timestamp("").is_none());
    }

    #[test]
    fn test_whole_days_until() {
        let now = Local.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let later = now + chrono::Duration::days(30);
        assert_eq!(whole_days_until(&later, &now), 30);

        let almost = now + chrono::Duration::days(30) - chrono::Duration::hours(1);
        assert_eq!(whole_days_until(&almost, &now), 29);

        let past = now - chrono::Duration::hours(1);
        assert_eq!(whole_days_until(&past, &now), -1);
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "CHATWARDEN_MOCK_TIME");
    }

    #[test]
    fn test_parse_mock_time_invalid_formats() {
        let invalid_formats = [
            "2025-12-25",          // Missing time
            "14:30:00",            // Missing date
            "2025/12/25 14:30:00", // Wrong date separator
            "2025-12-25T14:30:00", // ISO format (not supported)
            "",
        ];

        for format_str in &invalid_formats {
            let result = NaiveDateTime::parse_from_str(format_str, MOCK_TIME_FORMAT);
            assert!(
                result.is_err(),
                "Expected '{}' to fail parsing, but it succeeded",
                format_str
            );
        }
    }

    #[test]
    fn test_now_consistency() {
        let t1 = now();
        std::thread::sleep(Duration::from_millis(50));
        let t2 = now();

        assert!(t2 > t1, "Time should advance forward");
        let diff = t2.signed_duration_since(t1);
        assert!(
            diff.num_milliseconds() >= 40 && diff.num_milliseconds() <= 500,
            "Expected ~50ms difference, got {}ms",
            diff.num_milliseconds()
        );
    }
}
