//! # fluent-throttle
//!
//! A fluent logging API with per-log-site rate limiting, sampling and
//! structured metadata.
//!
//! Each logging call site is identified by its source location. Rate limiting
//! state is kept per call site, so `every(100)` in a hot loop emits the 1st,
//! 101st, 201st... invocation of *that* statement, independently of every
//! other statement. Emitted records carry the number of invocations skipped
//! since the previous one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluent_throttle::{FluentLogger, TimeUnit, TracingBackend};
//! use std::sync::Arc;
//!
//! // Records are forwarded to `tracing` events with target "fluent_throttle"
//! tracing_subscriber::fmt().init();
//!
//! let logger = FluentLogger::builder()
//!     .with_backend(Arc::new(TracingBackend::new("my_app")))
//!     .build()
//!     .unwrap();
//!
//! for request in 0..10_000 {
//!     logger
//!         .at_warn()
//!         .every(1000)
//!         .unwrap()
//!         .log(format_args!("slow request {request}"))
//!         .unwrap();
//! }
//! ```
//!
//! ## Features
//!
//! ### Rate Limiting
//! - **`every(n)`**: emit the first invocation and every `n`th after it
//! - **`on_average_every(n)`**: emit each invocation with probability `1/n`
//! - **`at_most_every(n, unit)`**: emit at most once per period
//! - **Custom limiters**: implement [`RateLimiter`] and register it on the
//!   [`LogSiteStateStore`]
//!
//! Limiters combine with AND semantics: a statement is emitted only if no
//! configured limiter disallows it, and only then does any limiter consume
//! its budget.
//!
//! ```rust,no_run
//! # use fluent_throttle::{FluentLogger, TimeUnit, TracingBackend};
//! # use std::sync::Arc;
//! # let logger = FluentLogger::builder()
//! #     .with_backend(Arc::new(TracingBackend::new("my_app")))
//! #     .build()
//! #     .unwrap();
//! // At most every 10th invocation, and no more than once per 30 seconds
//! logger
//!     .at_info()
//!     .every(10)
//!     .unwrap()
//!     .at_most_every(30, TimeUnit::Seconds)
//!     .unwrap()
//!     .log("cache miss")
//!     .unwrap();
//! ```
//!
//! ### Other Features
//! - **Per-value aggregation**: `per(value)`, `per_bucketed(value, strategy)`
//!   and `per_scope(scope_type)` keep separate state per value, bucket or scope
//! - **Structured metadata**: typed [`MetadataKey`]s, single or repeated
//! - **Scoped contexts**: thread-local tags, metadata and scopes applied to
//!   every statement inside [`ScopedLoggingContext`]
//! - **Forced logging**: `force()` bypasses rate limiting; contexts can force
//!   a level on
//! - **Observability metrics**: emitted, skipped and forced statements
//!
//! ## Per-Value Aggregation
//!
//! ```rust,no_run
//! # use fluent_throttle::{BucketingStrategy, FluentLogger, TracingBackend};
//! # use std::sync::Arc;
//! # let logger = FluentLogger::builder()
//! #     .with_backend(Arc::new(TracingBackend::new("my_app")))
//! #     .build()
//! #     .unwrap();
//! # let (user, path) = ("alice", "/orders/17");
//! // Separate state per user
//! logger.at_warn().every(100).unwrap().per(user).log("quota exceeded").unwrap();
//!
//! // Unbounded values are hashed into 16 buckets
//! let by_path = BucketingStrategy::<str>::by_hash(16).unwrap();
//! logger
//!     .at_warn()
//!     .every(100)
//!     .unwrap()
//!     .per_bucketed(path, &by_path)
//!     .log("not found")
//!     .unwrap();
//! ```
//!
//! State for a scope created by a [`ScopedLoggingContext`] is removed when
//! the context closes.
//!
//! ## Metadata
//!
//! ```rust,no_run
//! # use fluent_throttle::{FluentLogger, MetadataKey, TracingBackend};
//! # use std::sync::Arc;
//! # let logger = FluentLogger::builder()
//! #     .with_backend(Arc::new(TracingBackend::new("my_app")))
//! #     .build()
//! #     .unwrap();
//! let order_id = MetadataKey::<u64>::single("order_id").unwrap();
//! let item = MetadataKey::<String>::repeated("item").unwrap();
//!
//! // "order shipped [CONTEXT order_id=17 item="book" item="pen" ]"
//! logger
//!     .at_info()
//!     .with(&order_id, 17)
//!     .with(&item, "book".to_string())
//!     .with(&item, "pen".to_string())
//!     .log("order shipped")
//!     .unwrap();
//! ```
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use fluent_throttle::{FluentLogger, TracingBackend};
//! # use std::sync::Arc;
//! # let logger = FluentLogger::builder()
//! #     .with_backend(Arc::new(TracingBackend::new("my_app")))
//! #     .build()
//! #     .unwrap();
//! let metrics = logger.metrics();
//! println!("Statements emitted: {}", metrics.statements_emitted());
//! println!("Statements skipped: {}", metrics.statements_skipped());
//!
//! let snapshot = metrics.snapshot();
//! println!("Skip rate: {:.2}%", snapshot.skip_rate() * 100.0);
//! ```
//!
//! ## Fail-Safe Operation
//!
//! A rate limiter that panics is ignored for that statement, so the
//! statement is emitted rather than silenced. A message or metadata value
//! whose `Display` implementation panics is rendered as a placeholder.

// Domain layer - pure types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    bucketing::BucketingStrategy,
    error::{BackendError, BuildError, LogError},
    keys::{
        LogCause, LOG_AT_MOST_EVERY, LOG_CAUSE, LOG_EVERY_N, LOG_SAMPLE_EVERY_N,
        LOG_SITE_GROUPING_KEY, SKIPPED_LOG_COUNT, TAGS, WAS_FORCED,
    },
    log_site::{LogSite, LogSiteKey, Qualifier},
    metadata::{Metadata, MutableMetadata},
    metadata_key::{AnyMetadataKey, CustomEmitter, KeyValueSink, MetadataKey},
    period::{RateLimitPeriod, TimeUnit},
    scope::{LoggingScope, ScopeType},
    status::{committed, RateLimitStatus, Rollback},
    tags::{TagValue, Tags},
    value::MetadataValue,
};

pub use application::{
    context::LogApi,
    handler::{MapBasedHandler, MetadataHandler},
    log_site_map::LogSiteMap,
    logger::{FluentLogger, FluentLoggerBuilder},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, ContextDataProvider, LoggerBackend, RandomSource, RateLimiter, Storage},
    processor::MetadataProcessor,
    record::LogRecord,
    scoped::{ContextError, ScopedLoggingContext, ThreadLocalContextProvider},
    state_store::{LogDecision, LogSiteStateStore},
};

pub use infrastructure::{
    backend::TracingBackend, clock::SystemClock, formatter::KeyValueFormatter,
    random::ThreadRandom, storage::ShardedStorage,
};
