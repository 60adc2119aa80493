//! "Every Nth invocation" rate limiting.

use super::parameter;
use crate::application::log_site_map::LogSiteMap;
use crate::application::metrics::Metrics;
use crate::application::ports::RateLimiter;
use crate::domain::keys::LOG_EVERY_N;
use crate::domain::log_site::LogSiteKey;
use crate::domain::metadata::Metadata;
use crate::domain::status::{committed, RateLimitStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-key state: the configured `n` in the high half and the number of
/// invocations still to skip in the low half, updated as one word.
#[derive(Debug, Default)]
struct CountingState {
    packed: AtomicU64,
}

fn pack(target: u32, remaining: u32) -> u64 {
    (u64::from(target) << 32) | u64::from(remaining)
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

/// The state after one invocation, and whether that invocation takes the
/// emission slot. Every other invocation counts down by one.
fn advance(packed: u64, n: u32) -> (u64, bool) {
    let (target, remaining) = unpack(packed);
    if target != n || remaining == 0 {
        (pack(n, n - 1), true)
    } else {
        (pack(target, remaining - 1), false)
    }
}

/// Allows the first invocation of a log site and then every `n`th one.
///
/// A change of `n` for a key restarts counting, so the next invocation is
/// allowed.
#[derive(Debug, Default)]
pub struct CountingRateLimiter {
    states: LogSiteMap<CountingState>,
}

impl CountingRateLimiter {
    /// Create a limiter with no state.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_metrics(metrics: Metrics) -> Self {
        Self {
            states: LogSiteMap::new().with_metrics(metrics),
        }
    }

    /// Number of log-site keys with counting state.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Take the emission slot on commit. If another invocation took it since
    /// `observed`, this one is counted down against the fresh state instead
    /// and the statement is skipped.
    fn allow(state: Arc<CountingState>, observed: u64, n: u32) -> RateLimitStatus {
        RateLimitStatus::pending(move || {
            let mut current = observed;
            loop {
                let (next, takes_slot) = advance(current, n);
                match state.packed.compare_exchange(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) if takes_slot => break,
                    Ok(_) => return None,
                    Err(actual) => current = actual,
                }
            }
            // Hand the slot back to the next invocation.
            committed(move || {
                let _ = state
                    .packed
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                        (unpack(packed).0 == n).then(|| pack(n, 0))
                    });
            })
        })
    }
}

impl RateLimiter for CountingRateLimiter {
    fn check(
        &self,
        metadata: &dyn Metadata,
        key: &LogSiteKey,
        _now_nanos: u64,
    ) -> Option<RateLimitStatus> {
        let n = *parameter(metadata, &*LOG_EVERY_N)?;
        if n == 0 {
            return None;
        }
        let state = self.states.get(key, CountingState::default);

        let mut current = state.packed.load(Ordering::Acquire);
        loop {
            let (next, takes_slot) = advance(current, n);
            if takes_slot {
                return Some(Self::allow(state, current, n));
            }
            match state.packed.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(RateLimitStatus::Disallow),
                Err(actual) => current = actual,
            }
        }
    }

    fn sweep(&self) {
        self.states.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log_site::LogSite;
    use crate::domain::metadata::MutableMetadata;

    fn every(n: u32) -> MutableMetadata {
        let mut metadata = MutableMetadata::new();
        metadata.add_value(&*LOG_EVERY_N, n);
        metadata
    }

    fn key(line: u32) -> LogSiteKey {
        LogSiteKey::for_site(LogSite::new("src/counting.rs", line, 1))
    }

    fn decide(limiter: &CountingRateLimiter, metadata: &MutableMetadata, key: &LogSiteKey) -> bool {
        limiter
            .check(metadata, key, 0)
            .is_some_and(|status| status.commit())
    }

    #[test]
    fn test_every_three_over_hundred_calls() {
        let limiter = CountingRateLimiter::new();
        let metadata = every(3);
        let key = key(1);

        let allowed: Vec<usize> = (0..100).filter(|_| decide(&limiter, &metadata, &key)).collect();

        assert_eq!(allowed.len(), 34);
        assert!(allowed.iter().all(|i| i % 3 == 0));
        assert_eq!(allowed.first(), Some(&0));
        assert_eq!(allowed.last(), Some(&99));
    }

    #[test]
    fn test_not_configured() {
        let limiter = CountingRateLimiter::new();
        assert!(limiter.check(&MutableMetadata::new(), &key(2), 0).is_none());
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_uncommitted_allow_stays_allowed() {
        let limiter = CountingRateLimiter::new();
        let metadata = every(5);
        let key = key(3);

        // Another limiter vetoed the statement, so the reset never ran.
        let status = limiter.check(&metadata, &key, 0).unwrap();
        assert!(status.is_allowed());
        drop(status);

        assert!(decide(&limiter, &metadata, &key));
        assert!(!decide(&limiter, &metadata, &key));
    }

    #[test]
    fn test_lost_slot_still_counts_down() {
        let limiter = CountingRateLimiter::new();
        let metadata = every(3);
        let key = key(6);

        // Two invocations both see the free slot before either commits.
        let first = limiter.check(&metadata, &key, 0).unwrap();
        let second = limiter.check(&metadata, &key, 0).unwrap();
        assert!(first.commit());
        assert!(!second.commit());

        let emitted: Vec<usize> = (2..12).filter(|_| decide(&limiter, &metadata, &key)).collect();
        assert_eq!(emitted, vec![3, 6, 9]);
    }

    #[test]
    fn test_rollback_returns_slot() {
        let limiter = CountingRateLimiter::new();
        let metadata = every(4);
        let key = key(7);

        let status = limiter.check(&metadata, &key, 0).unwrap();
        let RateLimitStatus::Pending(mut resets) = status else {
            panic!("expected a pending reset");
        };
        let undo = resets.remove(0)().unwrap();
        assert!(!decide(&limiter, &metadata, &key));
        undo();

        assert!(decide(&limiter, &metadata, &key));
        assert!(!decide(&limiter, &metadata, &key));
    }

    #[test]
    fn test_changing_n_restarts() {
        let limiter = CountingRateLimiter::new();
        let key = key(4);

        assert!(decide(&limiter, &every(10), &key));
        assert!(!decide(&limiter, &every(10), &key));
        assert!(decide(&limiter, &every(2), &key));
        assert!(!decide(&limiter, &every(2), &key));
        assert!(decide(&limiter, &every(2), &key));
    }

    #[test]
    fn test_single_budget_under_contention() {
        use std::sync::Barrier;
        use std::thread;

        let limiter = Arc::new(CountingRateLimiter::new());
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                let metadata = every(1_000);
                barrier.wait();
                (0..100)
                    .filter(|_| decide(&limiter, &metadata, &key(5)))
                    .count()
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
    }
}
