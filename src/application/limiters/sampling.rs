//! Probabilistic "1 in N" rate limiting.

use super::parameter;
use crate::application::log_site_map::LogSiteMap;
use crate::application::metrics::Metrics;
use crate::application::ports::{RandomSource, RateLimiter};
use crate::domain::keys::LOG_SAMPLE_EVERY_N;
use crate::domain::log_site::LogSiteKey;
use crate::domain::metadata::Metadata;
use crate::domain::status::{committed, RateLimitStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SamplingState {
    pending_hits: AtomicU64,
}

/// Allows invocations with probability `1/n` on average.
///
/// A random hit is remembered as pending until a statement is actually
/// emitted, so hits vetoed by another limiter are not lost.
#[derive(Debug)]
pub struct SamplingRateLimiter {
    random: Arc<dyn RandomSource>,
    states: LogSiteMap<SamplingState>,
}

impl SamplingRateLimiter {
    /// Create a limiter drawing from `random`.
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self {
            random,
            states: LogSiteMap::new(),
        }
    }

    pub(crate) fn with_metrics(random: Arc<dyn RandomSource>, metrics: Metrics) -> Self {
        Self {
            random,
            states: LogSiteMap::new().with_metrics(metrics),
        }
    }
}

impl RateLimiter for SamplingRateLimiter {
    fn check(
        &self,
        metadata: &dyn Metadata,
        key: &LogSiteKey,
        _now_nanos: u64,
    ) -> Option<RateLimitStatus> {
        let n = *parameter(metadata, &*LOG_SAMPLE_EVERY_N)?;
        if n == 0 {
            return None;
        }
        let state = self.states.get(key, SamplingState::default);

        if self.random.one_in(n) {
            state.pending_hits.fetch_add(1, Ordering::AcqRel);
        }
        if state.pending_hits.load(Ordering::Acquire) == 0 {
            return Some(RateLimitStatus::Disallow);
        }
        Some(RateLimitStatus::pending(move || {
            state
                .pending_hits
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |hits| hits.checked_sub(1))
                .ok()?;
            committed(move || {
                state.pending_hits.fetch_add(1, Ordering::AcqRel);
            })
        }))
    }

    fn sweep(&self) {
        self.states.sweep();
    }
}
