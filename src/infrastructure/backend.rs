//! Backend forwarding records to `tracing`.

use crate::application::ports::LoggerBackend;
use crate::application::record::LogRecord;
use crate::domain::error::BackendError;
use crate::infrastructure::formatter::KeyValueFormatter;
use std::sync::Arc;
use tracing::field;
use tracing::Level;

/// Target of every event emitted by [`TracingBackend`].
pub const TARGET: &str = "fluent_throttle";

/// Writes each record as a `tracing` event at the record's level.
///
/// The event message is the record message with its metadata appended by
/// [`KeyValueFormatter`]. The logger name and log site are separate fields,
/// as is the cause when present.
#[derive(Debug, Clone)]
pub struct TracingBackend {
    name: Arc<str>,
    formatter: KeyValueFormatter,
}

impl TracingBackend {
    /// Create a backend for the logger `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            formatter: KeyValueFormatter::new(),
        }
    }
}

macro_rules! forward {
    ($level:expr, $record:ident, $text:ident) => {
        tracing::event!(
            target: TARGET,
            $level,
            logger = %$record.logger_name(),
            log_site = %$record.log_site(),
            forced = $record.was_forced(),
            cause = $record.cause().map(field::display),
            "{}",
            $text
        )
    };
}

impl LoggerBackend for TracingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loggable(&self, level: Level) -> bool {
        match level {
            Level::ERROR => tracing::enabled!(target: TARGET, Level::ERROR),
            Level::WARN => tracing::enabled!(target: TARGET, Level::WARN),
            Level::INFO => tracing::enabled!(target: TARGET, Level::INFO),
            Level::DEBUG => tracing::enabled!(target: TARGET, Level::DEBUG),
            _ => tracing::enabled!(target: TARGET, Level::TRACE),
        }
    }

    fn log(&self, record: &LogRecord) -> Result<(), BackendError> {
        let text = self.formatter.format(record);
        match record.level() {
            Level::ERROR => forward!(Level::ERROR, record, text),
            Level::WARN => forward!(Level::WARN, record, text),
            Level::INFO => forward!(Level::INFO, record, text),
            Level::DEBUG => forward!(Level::DEBUG, record, text),
            _ => forward!(Level::TRACE, record, text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::logger::FluentLogger;
    use crate::application::ports::NoOpContextProvider;
    use crate::infrastructure::mocks::MockCaptureLayer;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Layer;

    fn logger() -> FluentLogger {
        FluentLogger::builder()
            .with_backend(Arc::new(TracingBackend::new("orders")))
            .with_context_provider(Arc::new(NoOpContextProvider))
            .build()
            .unwrap()
    }

    #[test]
    fn test_forwards_level_message_and_fields() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let logger = logger();

        tracing::subscriber::with_default(subscriber, || {
            logger
                .at_warn()
                .with_cause(std::fmt::Error)
                .log("payment declined")
                .unwrap();
        });

        let events: Vec<_> = capture
            .get_captured()
            .into_iter()
            .filter(|e| e.target == TARGET)
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[0].message, "payment declined");
        assert_eq!(events[0].fields["logger"], "orders");
        assert_eq!(events[0].fields["forced"], "false");
        assert!(events[0].fields.contains_key("cause"));
        assert!(events[0].fields["log_site"].contains("backend.rs"));
    }

    #[test]
    fn test_is_loggable_follows_subscriber() {
        let capture = MockCaptureLayer::new();
        let subscriber =
            tracing_subscriber::registry().with(capture.clone().with_filter(LevelFilter::INFO));
        let logger = logger();

        tracing::subscriber::with_default(subscriber, || {
            assert!(logger.at_info().is_enabled());
            assert!(!logger.at_debug().is_enabled());
            logger.at_debug().log("dropped").unwrap();
        });
        assert_eq!(capture.count(), 0);
    }
}
