//! The logger and its builder.

use crate::application::context::LogApi;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, ContextDataProvider, LoggerBackend};
use crate::application::scoped::ThreadLocalContextProvider;
use crate::application::state_store::LogSiteStateStore;
use crate::domain::error::BuildError;
use crate::domain::log_site::LogSite;
use crate::infrastructure::clock::SystemClock;
use std::sync::Arc;
use tracing::Level;

/// Entry point of the fluent API.
///
/// # Examples
///
/// ```
/// use fluent_throttle::{FluentLogger, TimeUnit, TracingBackend};
/// use std::sync::Arc;
///
/// let logger = FluentLogger::builder()
///     .with_backend(Arc::new(TracingBackend::new("my_app")))
///     .build()
///     .unwrap();
///
/// for attempt in 0..10 {
///     logger
///         .at_warn()
///         .every(5)
///         .unwrap()
///         .at_most_every(30, TimeUnit::Seconds)
///         .unwrap()
///         .log(format_args!("retrying connection, attempt {attempt}"))
///         .unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FluentLogger {
    name: Arc<str>,
    backend: Arc<dyn LoggerBackend>,
    clock: Arc<dyn Clock>,
    store: Arc<LogSiteStateStore>,
    provider: Arc<dyn ContextDataProvider>,
}

impl FluentLogger {
    /// Create a builder for configuring the logger.
    pub fn builder() -> FluentLoggerBuilder {
        FluentLoggerBuilder::default()
    }

    /// Start a statement at `level`. The log site is the caller's location.
    ///
    /// Returns [`LogApi::Disabled`] unless the backend logs `level` or the
    /// context forces logging at `level`.
    #[track_caller]
    pub fn at(&self, level: Level) -> LogApi<'_> {
        let enabled = self.backend.is_loggable(level);
        let forced = self.provider.should_force_logging(&self.name, level, enabled);
        if !enabled && !forced {
            return LogApi::Disabled;
        }
        LogApi::enabled(self, level, LogSite::caller(), self.clock.now_nanos(), forced)
    }

    /// Start a statement at `ERROR`.
    #[track_caller]
    pub fn at_error(&self) -> LogApi<'_> {
        self.at(Level::ERROR)
    }

    /// Start a statement at `WARN`.
    #[track_caller]
    pub fn at_warn(&self) -> LogApi<'_> {
        self.at(Level::WARN)
    }

    /// Start a statement at `INFO`.
    #[track_caller]
    pub fn at_info(&self) -> LogApi<'_> {
        self.at(Level::INFO)
    }

    /// Start a statement at `DEBUG`.
    #[track_caller]
    pub fn at_debug(&self) -> LogApi<'_> {
        self.at(Level::DEBUG)
    }

    /// Start a statement at `TRACE`.
    #[track_caller]
    pub fn at_trace(&self) -> LogApi<'_> {
        self.at(Level::TRACE)
    }

    /// Logger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rate limiter state used by this logger.
    pub fn state_store(&self) -> &LogSiteStateStore {
        &self.store
    }

    /// Statement counters of the state store.
    pub fn metrics(&self) -> &Metrics {
        self.store.metrics()
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub(crate) fn backend(&self) -> &dyn LoggerBackend {
        &*self.backend
    }

    pub(crate) fn context_provider(&self) -> &dyn ContextDataProvider {
        &*self.provider
    }
}

/// Builder for [`FluentLogger`].
#[derive(Debug, Default)]
pub struct FluentLoggerBuilder {
    name: Option<String>,
    backend: Option<Arc<dyn LoggerBackend>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<LogSiteStateStore>>,
    provider: Option<Arc<dyn ContextDataProvider>>,
}

impl FluentLoggerBuilder {
    /// Set the logger name. Defaults to the backend's name.
    ///
    /// The name will be validated when `build()` is called.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the backend that writes emitted records. Required.
    pub fn with_backend(mut self, backend: Arc<dyn LoggerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share rate limiter state with other loggers.
    ///
    /// Default: a new store with the built-in limiters
    pub fn with_state_store(mut self, store: Arc<LogSiteStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the source of context tags, metadata, scopes and forced levels.
    ///
    /// Default: [`ThreadLocalContextProvider`], fed by
    /// [`ScopedLoggingContext`](crate::application::scoped::ScopedLoggingContext)
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the logger.
    ///
    /// # Errors
    /// Returns `BuildError::MissingBackend` if no backend was set, or
    /// `BuildError::EmptyName` if the name is empty.
    pub fn build(self) -> Result<FluentLogger, BuildError> {
        let backend = self.backend.ok_or(BuildError::MissingBackend)?;
        let name = self.name.unwrap_or_else(|| backend.name().to_string());
        if name.is_empty() {
            return Err(BuildError::EmptyName);
        }

        Ok(FluentLogger {
            name: Arc::from(name),
            backend,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            store: self.store.unwrap_or_default(),
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(ThreadLocalContextProvider)),
        })
    }
}
