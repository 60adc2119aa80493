//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of `at_most_every` rate limiting.
///
/// # Examples
///
/// ```
/// use fluent_throttle::infrastructure::mocks::MockClock;
/// use fluent_throttle::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_nanos(), 0);
///
/// clock.advance(Duration::from_millis(600));
/// assert_eq!(clock.now_nanos(), 600_000_000);
///
/// clock.set_nanos(5);
/// assert_eq!(clock.now_nanos(), 5);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    nanos: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock clock starting at the given timestamp.
    pub fn starting_at(nanos: u64) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(nanos)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Set the clock to an absolute timestamp.
    pub fn set_nanos(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let clock = MockClock::starting_at(100);
        assert_eq!(clock.now_nanos(), 100);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now_nanos(), 10_000_000_100);

        clock.set_nanos(7);
        assert_eq!(clock.now_nanos(), 7);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::new();
        let clone = clock.clone();

        let handle = std::thread::spawn(move || clone.advance(Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(clock.now_nanos(), 5_000_000_000);
    }
}
