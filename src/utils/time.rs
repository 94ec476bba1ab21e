//! Time utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch (0 if the clock is before it)
pub fn current_timestamp() -> u64 {
    current_timestamp_duration().as_secs()
}

/// Duration since the Unix epoch
pub fn current_timestamp_duration() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Whole microseconds in a duration, saturating
pub fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
