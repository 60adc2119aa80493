//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::application::record::LogRecord;
use crate::domain::error::BackendError;
use crate::domain::log_site::LogSiteKey;
use crate::domain::metadata::{Metadata, MutableMetadata};
use crate::domain::scope::{LoggingScope, ScopeType};
use crate::domain::status::RateLimitStatus;
use crate::domain::tags::Tags;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::Level;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Monotonic timestamp in nanoseconds.
    fn now_nanos(&self) -> u64;
}

/// Port for concurrent key-value storage.
///
/// This abstraction allows the application layer to store and retrieve values
/// without depending on specific concurrent data structure implementations.
/// Infrastructure provides concrete implementations (ShardedStorage).
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Remove an entry, returning its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Port for the backend that writes emitted log records.
///
/// Backend failures are returned to the caller of `log()` and never retried.
pub trait LoggerBackend: Send + Sync + Debug {
    /// Name of the logger this backend writes for.
    fn name(&self) -> &str;

    /// Whether records at `level` would be written.
    fn is_loggable(&self, level: Level) -> bool;

    /// Write a record.
    fn log(&self, record: &LogRecord) -> Result<(), BackendError>;
}

/// Port for ambient, per-thread logging context.
///
/// Supplies scope metadata and tags, the current scope for a scope type, and
/// forced-logging decisions.
pub trait ContextDataProvider: Send + Sync + Debug {
    /// Tags from the current context.
    fn tags(&self) -> Tags {
        Tags::empty()
    }

    /// Metadata from the current context.
    fn metadata(&self) -> MutableMetadata {
        MutableMetadata::new()
    }

    /// The innermost open scope of the given type, if any.
    fn current_scope(&self, _scope_type: &ScopeType) -> Option<LoggingScope> {
        None
    }

    /// Whether a statement at `level` must be logged regardless of level and
    /// rate limiting. `enabled_by_level` reports the backend's own decision.
    fn should_force_logging(&self, _logger_name: &str, _level: Level, _enabled_by_level: bool) -> bool {
        false
    }
}

/// A context provider with no context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpContextProvider;

impl ContextDataProvider for NoOpContextProvider {}

/// Port for sampling decisions.
pub trait RandomSource: Send + Sync + Debug {
    /// Returns `true` with probability `1/n`. `n` is at least 1.
    fn one_in(&self, n: u32) -> bool;
}

/// Port for rate limiters.
///
/// A limiter inspects the statement's metadata for its own configuration and
/// returns `None` when it is not configured for this statement. Consuming a
/// budget belongs in the resets of the returned status, so a statement
/// disallowed by another limiter leaves the budget untouched. A reset returns
/// its undo (see [`committed`](crate::domain::status::committed)), which runs
/// if another reset of the same statement loses its race.
pub trait RateLimiter: Send + Sync + Debug {
    /// Check the limiter for one invocation of `key`.
    fn check(
        &self,
        metadata: &dyn Metadata,
        key: &LogSiteKey,
        now_nanos: u64,
    ) -> Option<RateLimitStatus>;

    /// Drop state for closed scopes that has not been removed yet.
    fn sweep(&self) {}
}
