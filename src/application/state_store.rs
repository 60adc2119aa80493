//! Per-log-site rate limiting state.
//!
//! The `LogSiteStateStore` owns every rate limiter and the per-key skip
//! counters. It is shared between loggers by passing an `Arc`. A statement is
//! decided in two steps:
//!
//! 1. [`LogSiteStateStore::check`] queries every limiter and combines the
//!    results, so one disallow vetoes the statement.
//! 2. [`LogSiteStateStore::check_status`] commits the combined resets and
//!    maintains the skip counter, returning how many invocations were skipped
//!    since the last emitted one. A reset that loses its race to another
//!    thread skips the statement and rolls back the resets committed before
//!    it.

use crate::application::limiters::{CountingRateLimiter, DurationRateLimiter, SamplingRateLimiter};
use crate::application::log_site_map::LogSiteMap;
use crate::application::metrics::Metrics;
use crate::application::ports::{RandomSource, RateLimiter};
use crate::domain::log_site::LogSiteKey;
use crate::domain::metadata::Metadata;
use crate::domain::status::RateLimitStatus;
use crate::infrastructure::random::ThreadRandom;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a rate limiting decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDecision {
    /// Emit the statement
    Emit {
        /// Invocations skipped since the last emitted one
        skipped: u64,
    },
    /// Drop the statement
    Skip,
}

impl LogDecision {
    /// Check if the statement should be emitted.
    pub fn should_emit(&self) -> bool {
        matches!(self, LogDecision::Emit { .. })
    }
}

/// Rate limiter state for all log sites.
#[derive(Debug)]
pub struct LogSiteStateStore {
    limiters: Vec<Arc<dyn RateLimiter>>,
    skipped: LogSiteMap<AtomicU64>,
    metrics: Metrics,
}

impl LogSiteStateStore {
    /// Create a store with the built-in limiters and thread-local randomness.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the store.
    pub fn builder() -> LogSiteStateStoreBuilder {
        LogSiteStateStoreBuilder::default()
    }

    /// Query every limiter for one invocation of `key` and combine the
    /// results. `None` means no limiter is configured for the statement.
    ///
    /// A limiter that panics is treated as not configured, so a broken
    /// limiter lets statements through rather than silencing them.
    pub fn check(
        &self,
        metadata: &dyn Metadata,
        key: &LogSiteKey,
        now_nanos: u64,
    ) -> Option<RateLimitStatus> {
        self.limiters.iter().fold(None, |combined, limiter| {
            let status = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                limiter.check(metadata, key, now_nanos)
            }))
            .unwrap_or_else(|_| {
                tracing::warn!(limiter = ?limiter, key = %key, "rate limiter panicked; ignoring it");
                None
            });
            RateLimitStatus::combine(combined, status)
        })
    }

    /// Turn a combined status into a decision, committing resets and
    /// updating the skip counter for `key`.
    pub fn check_status(&self, status: Option<RateLimitStatus>, key: &LogSiteKey) -> LogDecision {
        let Some(status) = status else {
            return LogDecision::Emit { skipped: 0 };
        };
        let skipped = self.skipped.get(key, AtomicU64::default);

        if !status.is_allowed() {
            skipped.fetch_add(1, Ordering::AcqRel);
            self.metrics.record_skipped();
            return LogDecision::Skip;
        }
        if !status.commit() {
            tracing::trace!(key = %key, "lost rate limit reset race");
            skipped.fetch_add(1, Ordering::AcqRel);
            self.metrics.record_skipped();
            return LogDecision::Skip;
        }
        LogDecision::Emit {
            skipped: skipped.swap(0, Ordering::AcqRel),
        }
    }

    /// Remove state left behind by closed scopes.
    pub fn sweep(&self) {
        for limiter in &self.limiters {
            limiter.sweep();
        }
        self.skipped.sweep();
    }

    /// Metrics shared with every logger using this store.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl Default for LogSiteStateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`LogSiteStateStore`].
#[derive(Debug, Default)]
pub struct LogSiteStateStoreBuilder {
    random: Option<Arc<dyn RandomSource>>,
    custom: Vec<Arc<dyn RateLimiter>>,
    metrics: Option<Metrics>,
}

impl LogSiteStateStoreBuilder {
    /// Set the random source used by `on_average_every`.
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Add a custom rate limiter, consulted after the built-in ones.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.custom.push(limiter);
        self
    }

    /// Record into existing metrics instead of new ones.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the store.
    pub fn build(self) -> LogSiteStateStore {
        let metrics = self.metrics.unwrap_or_default();
        let random = self
            .random
            .unwrap_or_else(|| Arc::new(ThreadRandom::new()));

        let mut limiters: Vec<Arc<dyn RateLimiter>> = vec![
            Arc::new(CountingRateLimiter::with_metrics(metrics.clone())),
            Arc::new(DurationRateLimiter::with_metrics(metrics.clone())),
            Arc::new(SamplingRateLimiter::with_metrics(random, metrics.clone())),
        ];
        limiters.extend(self.custom);

        LogSiteStateStore {
            limiters,
            skipped: LogSiteMap::new().with_metrics(metrics.clone()),
            metrics,
        }
    }
}
