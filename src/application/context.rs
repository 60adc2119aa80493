//! The fluent statement API.
//!
//! [`FluentLogger::at`](crate::application::logger::FluentLogger::at) returns a
//! [`LogApi`]. Chained calls accumulate metadata and rate limiting
//! parameters; the terminal [`LogApi::log`] decides whether the statement is
//! emitted and, if so, hands a [`LogRecord`] to the backend.
//!
//! A statement at a disabled level is [`LogApi::Disabled`]: it allocates
//! nothing and ignores every chained call except argument validation.

use crate::application::logger::FluentLogger;
use crate::application::record::LogRecord;
use crate::application::state_store::LogDecision;
use crate::domain::bucketing::BucketingStrategy;
use crate::domain::error::LogError;
use crate::domain::keys::{
    LogCause, LOG_AT_MOST_EVERY, LOG_CAUSE, LOG_EVERY_N, LOG_SAMPLE_EVERY_N, LOG_SITE_GROUPING_KEY,
    SKIPPED_LOG_COUNT, TAGS, WAS_FORCED,
};
use crate::domain::log_site::{LogSite, LogSiteKey, Qualifier};
use crate::domain::metadata::MutableMetadata;
use crate::domain::metadata_key::MetadataKey;
use crate::domain::period::{RateLimitPeriod, TimeUnit};
use crate::domain::scope::ScopeType;
use crate::domain::tags::Tags;
use crate::domain::value::safe_display;
use std::error::Error;
use std::fmt;
use std::hash::Hash;
use tracing::Level;

/// A log statement being built.
#[derive(Debug)]
pub enum LogApi<'a> {
    /// The statement may be emitted
    Enabled(Box<LogContext<'a>>),
    /// The level is disabled; every call is ignored
    Disabled,
}

/// State of an enabled statement.
#[derive(Debug)]
pub struct LogContext<'a> {
    logger: &'a FluentLogger,
    level: Level,
    log_site: LogSite,
    timestamp_nanos: u64,
    forced: bool,
    tags: Option<Tags>,
    metadata: MutableMetadata,
}

fn positive_count(n: i32, method: &str) -> Result<u32, LogError> {
    u32::try_from(n)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| LogError::invalid_argument(format!("{method}(n) requires n > 0, got {n}")))
}

impl<'a> LogApi<'a> {
    pub(crate) fn enabled(
        logger: &'a FluentLogger,
        level: Level,
        log_site: LogSite,
        timestamp_nanos: u64,
        forced: bool,
    ) -> Self {
        LogApi::Enabled(Box::new(LogContext {
            logger,
            level,
            log_site,
            timestamp_nanos,
            forced,
            tags: None,
            metadata: MutableMetadata::new(),
        }))
    }

    fn map(mut self, f: impl FnOnce(&mut LogContext<'a>)) -> Self {
        if let LogApi::Enabled(context) = &mut self {
            f(&mut **context);
        }
        self
    }

    /// Whether the statement can still be emitted.
    pub fn is_enabled(&self) -> bool {
        matches!(self, LogApi::Enabled(_))
    }

    /// Attach a metadata value. A singleton key replaces an earlier value for
    /// the same key.
    pub fn with<T>(self, key: &MetadataKey<T>, value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        self.map(|context| context.metadata.add_value(key, value))
    }

    /// Attach `true` for a boolean key.
    pub fn with_flag(self, key: &MetadataKey<bool>) -> Self {
        self.with(key, true)
    }

    /// Attach the error that caused this statement.
    pub fn with_cause(self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.map(|context| context.metadata.add_value(&*LOG_CAUSE, LogCause::new(cause)))
    }

    /// Add tags, merged with the tags of the current context.
    pub fn with_tags(self, tags: Tags) -> Self {
        self.map(|context| {
            context.tags = Some(match context.tags.take() {
                Some(existing) => existing.merge(&tags),
                None => tags,
            });
        })
    }

    /// Emit only every `n`th invocation, starting with the first.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `n <= 0`.
    pub fn every(self, n: i32) -> Result<Self, LogError> {
        let n = positive_count(n, "every")?;
        if n == 1 {
            return Ok(self);
        }
        Ok(self.map(|context| context.metadata.add_value(&*LOG_EVERY_N, n)))
    }

    /// Emit each invocation with probability `1/n`.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `n <= 0`.
    pub fn on_average_every(self, n: i32) -> Result<Self, LogError> {
        let n = positive_count(n, "on_average_every")?;
        if n == 1 {
            return Ok(self);
        }
        Ok(self.map(|context| context.metadata.add_value(&*LOG_SAMPLE_EVERY_N, n)))
    }

    /// Emit at most once per `n` units of time. A period of zero leaves any
    /// earlier period of the statement in place.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `n < 0`.
    pub fn at_most_every(self, n: i64, unit: TimeUnit) -> Result<Self, LogError> {
        let n = u64::try_from(n).map_err(|_| {
            LogError::invalid_argument(format!("at_most_every(n) requires n >= 0, got {n}"))
        })?;
        if n == 0 {
            return Ok(self);
        }
        let period = RateLimitPeriod::new(n, unit);
        Ok(self.map(|context| context.metadata.add_value(&*LOG_AT_MOST_EVERY, period)))
    }

    /// Keep separate rate limiter state for each distinct `key`.
    pub fn per<T>(self, key: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        self.map(|context| context.add_qualifier(Qualifier::value(key)))
    }

    /// Keep separate rate limiter state per bucket of `key`. A value the
    /// strategy does not bucket leaves the state shared.
    pub fn per_bucketed<T: ?Sized>(self, key: &T, strategy: &BucketingStrategy<T>) -> Self {
        self.map(|context| {
            if let Some(qualifier) = strategy.apply(key) {
                context.add_qualifier(qualifier);
            }
        })
    }

    /// Keep separate rate limiter state for the current scope of
    /// `scope_type`. The state is removed when the scope closes.
    pub fn per_scope(self, scope_type: &ScopeType) -> Self {
        self.map(|context| {
            let scope = context.logger.context_provider().current_scope(scope_type);
            if let Some(scope) = scope {
                context.add_qualifier(Qualifier::Scope(scope.downgrade()));
            }
        })
    }

    /// Emit regardless of rate limiting.
    pub fn force(self) -> Self {
        self.map(|context| context.forced = true)
    }

    /// Use `log_site` instead of the caller's location. An invalid site
    /// disables rate limiting for the statement.
    pub fn with_injected_log_site(self, log_site: LogSite) -> Self {
        self.map(|context| context.log_site = log_site)
    }

    /// Finish the statement.
    ///
    /// # Errors
    /// Returns `LogError::Backend` if the backend fails to write the record.
    pub fn log(self, message: impl fmt::Display) -> Result<(), LogError> {
        match self {
            LogApi::Enabled(context) => context.log(&message),
            LogApi::Disabled => Ok(()),
        }
    }
}

impl LogContext<'_> {
    fn add_qualifier(&mut self, qualifier: Qualifier) {
        self.metadata.add_value(&*LOG_SITE_GROUPING_KEY, qualifier);
    }

    fn log_site_key(&self) -> LogSiteKey {
        let grouping = LOG_SITE_GROUPING_KEY.erased();
        self.metadata
            .iter()
            .filter(|(key, _)| *key == grouping)
            .filter_map(|(_, value)| value.downcast_ref::<Qualifier>())
            .fold(LogSiteKey::for_site(self.log_site), |key, qualifier| {
                key.specialize(qualifier.clone())
            })
    }

    fn log<M: fmt::Display + ?Sized>(self: Box<Self>, message: &M) -> Result<(), LogError> {
        let key = (!self.forced && self.log_site.is_valid()).then(|| self.log_site_key());
        let LogContext {
            logger,
            level,
            log_site,
            timestamp_nanos,
            forced,
            tags,
            mut metadata,
        } = *self;
        let store = logger.state_store();

        if forced {
            metadata.add_value(&*WAS_FORCED, true);
            store.metrics().record_forced();
        } else if let Some(key) = key {
            let status = store.check(&metadata, &key, timestamp_nanos);
            match store.check_status(status, &key) {
                LogDecision::Skip => return Ok(()),
                LogDecision::Emit { skipped } if skipped > 0 => {
                    metadata.add_value(&*SKIPPED_LOG_COUNT, skipped);
                }
                LogDecision::Emit { .. } => {}
            }
        }

        let provider = logger.context_provider();
        let tags = match tags {
            Some(tags) => provider.tags().merge(&tags),
            None => provider.tags(),
        };
        if !tags.is_empty() {
            metadata.add_value(&*TAGS, tags);
        }

        let record = LogRecord {
            level,
            message: safe_display(message),
            log_site,
            timestamp_nanos,
            logger_name: logger.shared_name(),
            was_forced: forced,
            scope_metadata: provider.metadata(),
            statement_metadata: metadata,
        };
        store.metrics().record_emitted();
        logger.backend().log(&record).map_err(LogError::Backend)
    }
}
