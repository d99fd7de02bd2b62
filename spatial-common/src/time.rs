//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Fractional days elapsed between two timestamps
///
/// Returns 0.0 when `later` precedes `earlier` (clock skew between sources
/// must not produce negative ages).
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds();
    if millis <= 0 {
        return 0.0;
    }
    millis as f64 / 86_400_000.0
}

/// Convert seconds to a std duration
pub fn secs_to_duration(secs: u64) -> std::time::Duration {
    std::time::Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_days_between_whole_days() {
        let start = now();
        let end = start + Duration::days(30);
        assert!((days_between(start, end) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_days_between_fractional() {
        let start = now();
        let end = start + Duration::hours(12);
        assert!((days_between(start, end) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_days_between_reversed_is_zero() {
        let start = now();
        let end = start - Duration::days(3);
        assert_eq!(days_between(start, end), 0.0);
    }

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(30), std::time::Duration::from_millis(30_000));
    }
}
