//! Built-in rate limiters.
//!
//! Each limiter reads its configuration from the statement metadata (the
//! well-known keys set by `every`, `at_most_every` and `on_average_every`)
//! and keeps its per-log-site state in a [`LogSiteMap`](crate::application::log_site_map::LogSiteMap).

pub mod counting;
pub mod duration;
pub mod sampling;

pub use counting::CountingRateLimiter;
pub use duration::DurationRateLimiter;
pub use sampling::SamplingRateLimiter;

use crate::domain::metadata::Metadata;
use crate::domain::metadata_key::MetadataKey;
use std::fmt;

/// Read a limiter parameter. Only the typed fluent API writes these keys, so
/// a type mismatch means the parameter is absent.
fn parameter<'m, T>(metadata: &'m dyn Metadata, key: &MetadataKey<T>) -> Option<&'m T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    metadata.find_value(key).ok().flatten()
}
