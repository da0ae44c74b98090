//! Time utilities for rate bookkeeping.

use chrono::{DateTime, Duration, Utc};

/// Refresh timing constants.
pub mod constants {
    use super::Duration;

    /// Default number of days between automatic refreshes.
    pub const DEFAULT_REFRESH_INTERVAL_DAYS: u32 = 7;

    /// Milliseconds in one day.
    pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

    /// Default provider request timeout (10 seconds).
    pub fn provider_request_timeout() -> Duration {
        Duration::seconds(10)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Fractional days elapsed from `since` to `now`, at millisecond resolution.
///
/// Negative when `since` lies after `now`.
pub fn elapsed_days(since: Timestamp, now: Timestamp) -> f64 {
    let millis = now.signed_duration_since(since).num_milliseconds();
    millis as f64 / constants::MILLIS_PER_DAY
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_days() {
        let start = now();
        assert_eq!(elapsed_days(start, start + Duration::days(7)), 7.0);
        assert_eq!(elapsed_days(start, start + Duration::hours(12)), 0.5);
        assert!(elapsed_days(start + Duration::days(1), start) < 0.0);
    }

    #[test]
    fn test_duration_as_std() {
        assert_eq!(Duration::seconds(3).as_std(), std::time::Duration::from_secs(3));
        assert_eq!(Duration::seconds(-3).as_std(), std::time::Duration::ZERO);
    }
}
