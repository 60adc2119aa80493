//! Domain layer - pure types with no I/O.
//!
//! This layer contains the core concepts of the fluent logging API:
//! - Log sites and log-site keys (with `per(...)` specialization)
//! - Typed metadata keys, metadata values and metadata sequences
//! - Tags and well-known keys
//! - Logging scopes, which partition rate limiter state
//! - Rate limit statuses and their combination rule
//! - Bucketing strategies for `per(...)` aggregation
//!
//! All types in this layer are easily testable in isolation.

pub mod bucketing;
pub mod error;
pub mod keys;
pub mod log_site;
pub mod metadata;
pub mod metadata_key;
pub mod period;
pub mod scope;
pub mod status;
pub mod tags;
pub mod value;
