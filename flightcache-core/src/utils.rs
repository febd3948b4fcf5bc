//! Clock helpers.
//!
//! Cache timestamps are wall-clock milliseconds since the Unix epoch rather than
//! `Instant`s, because persisted entries must stay meaningful across processes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current time in milliseconds since the Unix epoch.
///
/// A clock set before the epoch reads as `0`.
///
/// # Examples
///
/// ```
/// use flightcache_core::utils::now_millis;
///
/// let a = now_millis();
/// let b = now_millis();
/// assert!(b >= a);
/// ```
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or(0)
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Returns `now + duration` in epoch milliseconds, saturating on overflow.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use flightcache_core::utils::millis_after;
///
/// assert_eq!(millis_after(1_000, Duration::from_secs(1)), 2_000);
/// assert_eq!(millis_after(u64::MAX, Duration::from_secs(1)), u64::MAX);
/// ```
pub fn millis_after(now: u64, duration: Duration) -> u64 {
    now.saturating_add(duration_millis(duration))
}
