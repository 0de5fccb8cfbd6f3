//! Attempt deadlines.

use std::time::{Duration, Instant};

/// A start time plus a timeout.
///
/// A deadline has passed only when the elapsed time is strictly greater than
/// the timeout: with a 30 s timeout, a poll at exactly 30.000 s is still in
/// time and a poll at 30.001 s is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn new(start: Instant, timeout: Duration) -> Self {
        Self { start, timeout }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since the attempt started. Zero if `now` is before the start.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.elapsed(now) > self.timeout
    }
}


#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use blynk_board_esp32_macros::tap_test;

    #[tap_test]
    fn deadline_boundary_on_device_clock() {
        let start = Instant::now();
        let deadline = Deadline::new(start, Duration::from_secs(30));
        assert!(!deadline.expired(start + Duration::from_millis(30_000)));
        assert!(deadline.expired(start + Duration::from_millis(30_001)));
    }
}
