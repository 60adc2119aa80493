//! Clock adapters for time operations.
//!
//! Provides SystemClock implementation for production use.
//!
//! # Testing
//!
//! See `MockClock` (in `crate::infrastructure::mocks`) for a controllable test clock.
//! Available with the `test-helpers` feature or in test builds.

use crate::application::ports::Clock;
use std::sync::LazyLock;
use std::time::Instant;

static PROCESS_START: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic system clock.
///
/// Timestamps count nanoseconds since the first use of any `SystemClock` in
/// the process, so all instances agree with each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        u64::try_from(PROCESS_START.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock::new();
        let t1 = clock.now_nanos();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = clock.now_nanos();

        assert!(t2 - t1 >= 10_000_000);
    }

    #[test]
    fn test_instances_agree() {
        let a = SystemClock::new().now_nanos();
        let b = SystemClock::new().now_nanos();
        assert!(b >= a);
    }
}
