//! Observability metrics for rate limiting.
//!
//! Provides counters for emitted, skipped and forced statements and for
//! log-site state removed by scope cleanup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking logging statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Statements handed to the backend
    statements_emitted: AtomicU64,
    /// Statements dropped by rate limiting
    statements_skipped: AtomicU64,
    /// Emitted statements that bypassed rate limiting
    statements_forced: AtomicU64,
    /// Log-site entries removed after their scope closed
    log_sites_evicted: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_emitted(&self) {
        self.inner.statements_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.inner.statements_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forced(&self) {
        self.inner.statements_forced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.log_sites_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of statements emitted.
    pub fn statements_emitted(&self) -> u64 {
        self.inner.statements_emitted.load(Ordering::Relaxed)
    }

    /// Get the total number of statements skipped by rate limiting.
    pub fn statements_skipped(&self) -> u64 {
        self.inner.statements_skipped.load(Ordering::Relaxed)
    }

    /// Get the number of emitted statements that were forced.
    pub fn statements_forced(&self) -> u64 {
        self.inner.statements_forced.load(Ordering::Relaxed)
    }

    /// Get the number of log-site entries evicted by scope cleanup.
    pub fn log_sites_evicted(&self) -> u64 {
        self.inner.log_sites_evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_emitted: self.statements_emitted(),
            statements_skipped: self.statements_skipped(),
            statements_forced: self.statements_forced(),
            log_sites_evicted: self.log_sites_evicted(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.statements_emitted.store(0, Ordering::Relaxed);
        self.inner.statements_skipped.store(0, Ordering::Relaxed);
        self.inner.statements_forced.store(0, Ordering::Relaxed);
        self.inner.log_sites_evicted.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Statements handed to the backend
    pub statements_emitted: u64,
    /// Statements dropped by rate limiting
    pub statements_skipped: u64,
    /// Emitted statements that bypassed rate limiting
    pub statements_forced: u64,
    /// Log-site entries removed after their scope closed
    pub log_sites_evicted: u64,
}

impl MetricsSnapshot {
    /// Ratio of skipped statements to all rate-limited decisions (0.0 to 1.0).
    ///
    /// Returns 0.0 if no statements have been processed.
    pub fn skip_rate(&self) -> f64 {
        let total = self.total_statements();
        if total == 0 {
            0.0
        } else {
            self.statements_skipped as f64 / total as f64
        }
    }

    /// Get the total number of statements processed (emitted + skipped).
    pub fn total_statements(&self) -> u64 {
        self.statements_emitted.saturating_add(self.statements_skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot {
            statements_emitted: 0,
            statements_skipped: 0,
            statements_forced: 0,
            log_sites_evicted: 0,
        });
    }

    #[test]
    fn test_snapshot() {
        let metrics = Metrics::new();
        metrics.record_emitted();
        metrics.record_emitted();
        metrics.record_skipped();
        metrics.record_forced();
        metrics.record_eviction();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.statements_emitted, 2);
        assert_eq!(snapshot.statements_skipped, 1);
        assert_eq!(snapshot.statements_forced, 1);
        assert_eq!(snapshot.log_sites_evicted, 1);
        assert_eq!(snapshot.total_statements(), 3);
    }

    #[test]
    fn test_snapshot_skip_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().skip_rate(), 0.0);

        metrics.record_emitted();
        metrics.record_skipped();
        assert!((metrics.snapshot().skip_rate() - 0.5).abs() < f64::EPSILON);

        metrics.record_skipped();
        metrics.record_skipped();
        assert!((metrics.snapshot().skip_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_emitted();
        metrics.record_skipped();
        metrics.record_eviction();

        metrics.reset();
        assert_eq!(metrics.snapshot().total_statements(), 0);
        assert_eq!(metrics.log_sites_evicted(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = Metrics::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_emitted();
                    m.record_skipped();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.statements_emitted(), 1000);
        assert_eq!(metrics.statements_skipped(), 1000);
    }
}
