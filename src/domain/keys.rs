//! Metadata keys with a fixed meaning, shared by the fluent API, the
//! formatter and backends.

use crate::domain::log_site::Qualifier;
use crate::domain::metadata_key::{
    AnyMetadataKey, CustomEmitter, EmitDepth, KeyValueSink, MetadataKey,
};
use crate::domain::period::RateLimitPeriod;
use crate::domain::tags::Tags;
use crate::domain::value::MetadataValue;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// The error that caused a log statement, attached with `with_cause`.
#[derive(Clone)]
pub struct LogCause(Arc<dyn Error + Send + Sync + 'static>);

impl LogCause {
    /// Wrap an error.
    pub fn new(error: impl Error + Send + Sync + 'static) -> Self {
        LogCause(Arc::new(error))
    }

    /// Wrap an already shared error.
    pub fn from_arc(error: Arc<dyn Error + Send + Sync + 'static>) -> Self {
        LogCause(error)
    }

    /// The wrapped error.
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Display for LogCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for LogCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

fn key<T>(label: &'static str, can_repeat: bool) -> MetadataKey<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    MetadataKey::build(Cow::Borrowed(label), can_repeat, None)
}

/// Cause of the log statement.
pub static LOG_CAUSE: LazyLock<MetadataKey<LogCause>> = LazyLock::new(|| key("cause", false));

/// Count passed to `every(n)`.
pub static LOG_EVERY_N: LazyLock<MetadataKey<u32>> =
    LazyLock::new(|| key("ratelimit_count", false));

/// Count passed to `on_average_every(n)`.
pub static LOG_SAMPLE_EVERY_N: LazyLock<MetadataKey<u32>> =
    LazyLock::new(|| key("sampling_count", false));

/// Period passed to `at_most_every(n, unit)`.
pub static LOG_AT_MOST_EVERY: LazyLock<MetadataKey<RateLimitPeriod>> =
    LazyLock::new(|| key("ratelimit_period", false));

/// Number of invocations skipped since the last emitted one.
pub static SKIPPED_LOG_COUNT: LazyLock<MetadataKey<u64>> = LazyLock::new(|| key("skipped", false));

/// Present when the statement bypassed rate limiting.
pub static WAS_FORCED: LazyLock<MetadataKey<bool>> = LazyLock::new(|| key("forced", false));

struct TagsEmitter;

impl CustomEmitter for TagsEmitter {
    fn emit(
        &self,
        key: &AnyMetadataKey,
        value: &MetadataValue,
        sink: &mut dyn KeyValueSink,
        _depth: EmitDepth,
    ) {
        let Some(tags) = value.downcast_ref::<Tags>() else {
            sink.handle(key.label(), value.as_log_value());
            return;
        };
        for (name, values) in tags.iter() {
            if values.is_empty() {
                sink.handle_name_only(name);
            }
            for value in values {
                sink.handle(name, value);
            }
        }
    }
}

/// Tags merged from the context and the statement, emitted one pair per tag
/// value.
pub static TAGS: LazyLock<MetadataKey<Tags>> = LazyLock::new(|| {
    MetadataKey::build(Cow::Borrowed("tags"), false, Some(Arc::new(TagsEmitter)))
});

struct GroupingEmitter;

impl CustomEmitter for GroupingEmitter {
    fn emit(
        &self,
        key: &AnyMetadataKey,
        value: &MetadataValue,
        sink: &mut dyn KeyValueSink,
        _depth: EmitDepth,
    ) {
        sink.handle(key.label(), &format!("[{value}]"));
    }

    fn emit_repeated(
        &self,
        key: &AnyMetadataKey,
        values: &mut dyn Iterator<Item = &MetadataValue>,
        sink: &mut dyn KeyValueSink,
        _depth: EmitDepth,
    ) {
        let joined = values
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        sink.handle(key.label(), &format!("[{joined}]"));
    }
}

/// Qualifiers added with `per(...)`, in call order.
pub static LOG_SITE_GROUPING_KEY: LazyLock<MetadataKey<Qualifier>> = LazyLock::new(|| {
    MetadataKey::build(
        Cow::Borrowed("group_by"),
        true,
        Some(Arc::new(GroupingEmitter)),
    )
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::LogValue;

    #[derive(Default)]
    struct Pairs(Vec<String>);

    impl KeyValueSink for Pairs {
        fn handle(&mut self, label: &str, value: &dyn LogValue) {
            self.0.push(format!("{label}={value}"));
        }

        fn handle_name_only(&mut self, label: &str) {
            self.0.push(label.to_string());
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(LOG_CAUSE.label(), "cause");
        assert_eq!(SKIPPED_LOG_COUNT.label(), "skipped");
        assert_eq!(LOG_SITE_GROUPING_KEY.label(), "group_by");
        assert!(LOG_SITE_GROUPING_KEY.can_repeat());
        assert!(!TAGS.can_repeat());
    }

    #[test]
    fn test_tags_emit_one_pair_per_value() {
        let tags = Tags::builder()
            .add("zone", "eu")
            .add("zone", "us")
            .add_name("canary")
            .build()
            .unwrap();
        let mut sink = Pairs::default();
        TAGS.emit(&MetadataValue::new(tags), &mut sink);
        assert_eq!(sink.0, vec!["canary", "zone=eu", "zone=us"]);
    }

    #[test]
    fn test_grouping_key_renders_list() {
        let values = [
            MetadataValue::new(Qualifier::value("a")),
            MetadataValue::new(Qualifier::value(2_u8)),
        ];
        let mut sink = Pairs::default();
        LOG_SITE_GROUPING_KEY.emit_repeated(&mut values.iter(), &mut sink);
        assert_eq!(sink.0, vec![r#"group_by=["a",2]"#]);
    }
}
