//! Per-log-site state maps.
//!
//! A `LogSiteMap` lazily creates one state value per [`LogSiteKey`]. Keys
//! specialized by a logging scope register a close hook on that scope; when
//! the scope closes the key is queued for removal, and the queue is drained
//! on the next access to the map (or an explicit [`LogSiteMap::sweep`]).

use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use crate::domain::log_site::LogSiteKey;
use crate::infrastructure::storage::ShardedStorage;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Default)]
struct CleanupQueue {
    has_pending: AtomicBool,
    pending: Mutex<Vec<LogSiteKey>>,
}

impl CleanupQueue {
    fn push(&self, key: LogSiteKey) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(key);
        self.has_pending.store(true, Ordering::Release);
    }

    fn take(&self) -> Vec<LogSiteKey> {
        if !self.has_pending.load(Ordering::Acquire) {
            return Vec::new();
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.has_pending.store(false, Ordering::Release);
        std::mem::take(&mut *pending)
    }
}

/// Concurrent map from log-site key to shared per-key state.
///
/// Generic over the storage implementation; the default is
/// [`ShardedStorage`].
pub struct LogSiteMap<V, S = ShardedStorage<LogSiteKey, Arc<V>>>
where
    S: Storage<LogSiteKey, Arc<V>>,
    V: Send + Sync,
{
    storage: Arc<S>,
    cleanup: Arc<CleanupQueue>,
    metrics: Metrics,
    _marker: PhantomData<fn() -> V>,
}

impl<V> LogSiteMap<V>
where
    V: fmt::Debug + Send + Sync + 'static,
{
    /// Create an empty map backed by sharded storage.
    pub fn new() -> Self {
        Self::with_storage(Arc::new(ShardedStorage::new()))
    }
}

impl<V> Default for LogSiteMap<V>
where
    V: fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> LogSiteMap<V, S>
where
    S: Storage<LogSiteKey, Arc<V>>,
    V: Send + Sync + 'static,
{
    /// Create an empty map over the given storage.
    pub fn with_storage(storage: Arc<S>) -> Self {
        Self {
            storage,
            cleanup: Arc::new(CleanupQueue::default()),
            metrics: Metrics::new(),
            _marker: PhantomData,
        }
    }

    /// Record evictions into the given metrics.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get the state for `key`, creating it with `factory` on first use.
    pub fn get(&self, key: &LogSiteKey, factory: impl FnOnce() -> V) -> Arc<V> {
        self.drain_cleanup();

        let mut created = false;
        let value = self.storage.with_entry_mut(
            key.clone(),
            || {
                created = true;
                Arc::new(factory())
            },
            |value| Arc::clone(value),
        );
        if created {
            self.register_cleanup(key);
        }
        value
    }

    fn register_cleanup(&self, key: &LogSiteKey) {
        for scope in key.scopes() {
            let queue: Weak<CleanupQueue> = Arc::downgrade(&self.cleanup);
            let key = key.clone();
            scope.on_close(Box::new(move || {
                if let Some(queue) = queue.upgrade() {
                    queue.push(key);
                }
            }));
        }
    }

    fn drain_cleanup(&self) {
        let keys = self.cleanup.take();
        if keys.is_empty() {
            return;
        }
        let mut removed = 0_usize;
        for key in &keys {
            if self.storage.remove(key).is_some() {
                self.metrics.record_eviction();
                removed += 1;
            }
        }
        tracing::debug!(queued = keys.len(), removed, "removed log-site state for closed scopes");
    }

    /// Drain queued removals and drop any entry whose scope is no longer
    /// open.
    pub fn sweep(&self) {
        self.drain_cleanup();
        let metrics = &self.metrics;
        self.storage.retain(|key, _| {
            let alive = key.scopes().iter().all(|scope| scope.is_alive());
            if !alive {
                metrics.record_eviction();
            }
            alive
        });
    }

    /// Number of keys with state, including keys queued for removal.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Remove all state.
    pub fn clear(&self) {
        self.storage.clear();
    }
}

impl<V, S> fmt::Debug for LogSiteMap<V, S>
where
    S: Storage<LogSiteKey, Arc<V>>,
    V: Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSiteMap")
            .field("entries", &self.storage.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log_site::{LogSite, Qualifier};
    use crate::domain::scope::LoggingScope;
    use std::sync::atomic::AtomicU32;

    fn key(line: u32) -> LogSiteKey {
        LogSiteKey::for_site(LogSite::new("src/worker.rs", line, 5))
    }

    #[test]
    fn test_state_created_once_per_key() {
        let map: LogSiteMap<AtomicU32> = LogSiteMap::new();
        let a = map.get(&key(1), || AtomicU32::new(0));
        a.fetch_add(1, Ordering::SeqCst);
        let b = map.get(&key(1), || AtomicU32::new(100));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_distinct_sites_distinct_state() {
        let map: LogSiteMap<AtomicU32> = LogSiteMap::new();
        let a = map.get(&key(1), || AtomicU32::new(0));
        let b = map.get(&key(2), || AtomicU32::new(0));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_scope_close_removes_on_next_access() {
        let metrics = Metrics::new();
        let map: LogSiteMap<AtomicU32> = LogSiteMap::new().with_metrics(metrics.clone());
        let scope = LoggingScope::create("request");
        let scoped = key(1).specialize(Qualifier::Scope(scope.downgrade()));

        map.get(&scoped, || AtomicU32::new(0));
        map.get(&key(2), || AtomicU32::new(0));
        assert_eq!(map.len(), 2);

        scope.close();
        // Removal is deferred until the map is touched again.
        assert_eq!(map.len(), 2);
        map.get(&key(2), || AtomicU32::new(0));
        assert_eq!(map.len(), 1);
        assert_eq!(metrics.log_sites_evicted(), 1);
    }

    #[test]
    fn test_scope_drop_queues_removal() {
        let map: LogSiteMap<AtomicU32> = LogSiteMap::new();
        {
            let scope = LoggingScope::create("task");
            let scoped = key(3).specialize(Qualifier::Scope(scope.downgrade()));
            map.get(&scoped, || AtomicU32::new(0));
        }
        map.sweep();
        assert!(map.is_empty());
    }

    #[test]
    fn test_closed_scope_key_is_removed_again() {
        let map: LogSiteMap<AtomicU32> = LogSiteMap::new();
        let scope = LoggingScope::create("late");
        let scoped = key(4).specialize(Qualifier::Scope(scope.downgrade()));
        scope.close();

        map.get(&scoped, || AtomicU32::new(0));
        assert_eq!(map.len(), 1);
        map.sweep();
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_get_shares_state() {
        use std::thread;

        let map: Arc<LogSiteMap<AtomicU32>> = Arc::new(LogSiteMap::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    map.get(&key(9), || AtomicU32::new(0))
                        .fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&key(9), || AtomicU32::new(0)).load(Ordering::SeqCst), 800);
    }
}
