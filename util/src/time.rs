//! General time utility functions

use chrono;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Number of milliseconds in a second
pub const MILLIS_PER_SECOND: f64 = 1000.0;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

/// Get the number of seconds between two millisecond timestamps.
///
/// Returns zero if `later_ms` is before `earlier_ms`.
pub fn ms_to_s_between(earlier_ms: u64, later_ms: u64) -> f64 {
    later_ms.saturating_sub(earlier_ms) as f64 / MILLIS_PER_SECOND
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ms_to_s_between() {
        assert_eq!(ms_to_s_between(1000, 1500), 0.5);
        assert_eq!(ms_to_s_between(1500, 1000), 0.0);
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(250)),
            Some(0.25)
        );
    }
}
