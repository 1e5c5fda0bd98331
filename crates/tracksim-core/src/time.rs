//! Wall-clock time for pose records
//!
//! Poses are stamped with wall-clock seconds since the Unix epoch so that
//! timestamps survive process restarts and snapshot files.

use std::ops::Sub;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch
#[derive(Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0.0);

    /// Current wall-clock time
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(since_epoch.as_secs_f64())
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp(secs)
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Whole seconds, truncated toward zero
    #[inline]
    pub fn as_secs(self) -> i64 {
        self.0 as i64
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        let diff = self.0 - rhs.0;
        if diff.is_finite() && diff > 0.0 {
            Duration::from_secs_f64(diff)
        } else {
            Duration::ZERO
        }
    }
}

impl std::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t({:.3}s)", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_epoch() {
        let now = Timestamp::now();
        assert!(now > Timestamp::EPOCH);
        assert!(now.as_secs() > 1_600_000_000);
    }

    #[test]
    fn test_timestamp_difference_saturates() {
        let a = Timestamp::from_secs_f64(10.0);
        let b = Timestamp::from_secs_f64(12.5);
        assert_eq!(b - a, Duration::from_millis(2500));
        assert_eq!(a - b, Duration::ZERO);
    }
}
