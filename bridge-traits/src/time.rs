//! Time source abstraction.
//!
//! Entries added to a saved collection carry an "added at" timestamp. Edits
//! take that timestamp from an injected [`Clock`] so tests can pin it.

use chrono::{DateTime, Utc};

/// Time source trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::time::Clock;
///
/// fn stamp(clock: &dyn Clock) -> String {
///     clock.now().to_rfc3339()
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockall::mock;

    mock! {
        pub FixedClock {}
        impl Clock for FixedClock {
            fn now(&self) -> DateTime<Utc>;
        }
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_millis_derived_from_now() {
        let mut clock = MockFixedClock::new();
        clock
            .expect_now()
            .returning(|| Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());

        assert_eq!(clock.unix_timestamp_millis(), 1_709_294_400_000);
    }
}
