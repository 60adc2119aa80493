//! "At most once per period" rate limiting.

use super::parameter;
use crate::application::log_site_map::LogSiteMap;
use crate::application::metrics::Metrics;
use crate::application::ports::RateLimiter;
use crate::domain::keys::LOG_AT_MOST_EVERY;
use crate::domain::log_site::LogSiteKey;
use crate::domain::metadata::Metadata;
use crate::domain::status::{committed, RateLimitStatus};
use std::sync::atomic::{AtomicU64, Ordering};

const NEVER: u64 = u64::MAX;

#[derive(Debug)]
struct DurationState {
    last_emitted: AtomicU64,
}

impl Default for DurationState {
    fn default() -> Self {
        Self {
            last_emitted: AtomicU64::new(NEVER),
        }
    }
}

/// Allows an invocation if none was emitted within the configured period.
///
/// This is not a sliding window: with a 2s period and a call every 600ms,
/// emission happens at 0s, 2.4s and 4.8s.
#[derive(Debug, Default)]
pub struct DurationRateLimiter {
    states: LogSiteMap<DurationState>,
}

impl DurationRateLimiter {
    /// Create a limiter with no state.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_metrics(metrics: Metrics) -> Self {
        Self {
            states: LogSiteMap::new().with_metrics(metrics),
        }
    }
}

impl RateLimiter for DurationRateLimiter {
    fn check(
        &self,
        metadata: &dyn Metadata,
        key: &LogSiteKey,
        now_nanos: u64,
    ) -> Option<RateLimitStatus> {
        let period = parameter(metadata, &*LOG_AT_MOST_EVERY)?.to_nanos();
        let state = self.states.get(key, DurationState::default);

        let last = state.last_emitted.load(Ordering::Acquire);
        if last != NEVER && now_nanos < last.saturating_add(period) {
            return Some(RateLimitStatus::Disallow);
        }
        Some(RateLimitStatus::pending(move || {
            state
                .last_emitted
                .compare_exchange(last, now_nanos, Ordering::AcqRel, Ordering::Acquire)
                .ok()?;
            committed(move || {
                let _ = state.last_emitted.compare_exchange(
                    now_nanos,
                    last,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            })
        }))
    }

    fn sweep(&self) {
        self.states.sweep();
    }
}
