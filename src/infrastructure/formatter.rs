//! Key/value rendering of log records.
//!
//! Produces `message [CONTEXT key=value key2="text" ]`. Strings and other
//! values are quoted and escaped; numbers and booleans are written raw. The
//! cause is left out, backends render it themselves.

use crate::application::handler::MetadataHandler;
use crate::application::processor::{MetadataProcessor, RepeatedValues};
use crate::application::record::LogRecord;
use crate::domain::keys::LOG_CAUSE;
use crate::domain::metadata_key::{AnyMetadataKey, KeyValueSink};
use crate::domain::tags::TagValue;
use crate::domain::value::{safe_to_string, LogValue, MetadataValue};
use std::any::Any;

const CONTEXT_PREFIX: &str = "[CONTEXT ";
const CONTEXT_SUFFIX: &str = "]";

/// Formats a message and its metadata on one line.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyValueFormatter;

impl KeyValueFormatter {
    /// Create a formatter.
    pub fn new() -> Self {
        Self
    }

    /// Format a record's message followed by its merged metadata.
    pub fn format(&self, record: &LogRecord) -> String {
        self.format_message(record.message(), &record.metadata())
    }

    /// Format `message` followed by `metadata`. Without metadata the message
    /// is returned unchanged.
    pub fn format_message(&self, message: &str, metadata: &MetadataProcessor<'_>) -> String {
        let mut writer = ContextWriter {
            out: String::from(message),
            opened: false,
        };
        metadata.process(&ContextHandler, &mut writer);
        if writer.opened {
            writer.out.push_str(CONTEXT_SUFFIX);
        }
        writer.out
    }
}

struct ContextHandler;

impl MetadataHandler<ContextWriter> for ContextHandler {
    fn handle(&self, key: &AnyMetadataKey, value: &MetadataValue, writer: &mut ContextWriter) {
        if key != LOG_CAUSE.erased() {
            key.emit(value, writer);
        }
    }

    fn handle_repeated(&self, key: &AnyMetadataKey, values: &mut RepeatedValues<'_>, writer: &mut ContextWriter) {
        key.emit_repeated(values, writer);
    }
}

struct ContextWriter {
    out: String,
    opened: bool,
}

impl ContextWriter {
    fn open(&mut self) {
        if !self.opened {
            if !self.out.is_empty() {
                self.out.push(' ');
            }
            self.out.push_str(CONTEXT_PREFIX);
            self.opened = true;
        }
    }
}

impl KeyValueSink for ContextWriter {
    fn handle(&mut self, label: &str, value: &dyn LogValue) {
        self.open();
        self.out.push_str(label);
        self.out.push('=');
        let text = safe_to_string(value);
        if is_raw(value.as_any()) {
            self.out.push_str(&text);
        } else {
            push_quoted(&mut self.out, &text);
        }
        self.out.push(' ');
    }

    fn handle_name_only(&mut self, label: &str) {
        self.open();
        self.out.push_str(label);
        self.out.push(' ');
    }
}

fn is_raw(value: &dyn Any) -> bool {
    macro_rules! any_of {
        ($($ty:ty),*) => { false $(|| value.is::<$ty>())* };
    }
    any_of!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64)
        || matches!(
            value.downcast_ref::<TagValue>(),
            Some(TagValue::Bool(_) | TagValue::Int(_) | TagValue::Float(_))
        )
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::{LogCause, TAGS};
    use crate::domain::metadata::MutableMetadata;
    use crate::domain::metadata_key::MetadataKey;
    use crate::domain::tags::Tags;

    fn format(scope: &MutableMetadata, statement: &MutableMetadata) -> String {
        let processor = MetadataProcessor::for_scope_and_log_site(scope, statement);
        KeyValueFormatter::new().format_message("hello", &processor)
    }

    #[test]
    fn test_no_metadata_leaves_message() {
        let empty = MutableMetadata::new();
        assert_eq!(format(&empty, &empty), "hello");
    }

    #[test]
    fn test_quoting_rules() {
        let count = MetadataKey::<i32>::single("count").unwrap();
        let flag = MetadataKey::<bool>::single("flag").unwrap();
        let text = MetadataKey::<String>::single("text").unwrap();

        let mut statement = MutableMetadata::new();
        statement.add_value(&count, 3);
        statement.add_value(&flag, true);
        statement.add_value(&text, "say \"hi\"\n".to_string());

        assert_eq!(
            format(&MutableMetadata::new(), &statement),
            r#"hello [CONTEXT count=3 flag=true text="say \"hi\"\n" ]"#
        );
    }

    #[test]
    fn test_scope_first_and_cause_skipped() {
        let user = MetadataKey::<&'static str>::single("user").unwrap();
        let ids = MetadataKey::<u32>::repeated("id").unwrap();

        let mut scope = MutableMetadata::new();
        scope.add_value(&user, "alice");
        scope.add_value(&ids, 1);
        let mut statement = MutableMetadata::new();
        statement.add_value(&*LOG_CAUSE, LogCause::new(std::fmt::Error));
        statement.add_value(&ids, 2);

        assert_eq!(
            format(&scope, &statement),
            r#"hello [CONTEXT user="alice" id=1 id=2 ]"#
        );
    }

    #[test]
    fn test_tags_expand_to_pairs() {
        let tags = Tags::builder()
            .add("zone", "eu")
            .add("shard", 7)
            .add_name("canary")
            .build()
            .unwrap();
        let mut statement = MutableMetadata::new();
        statement.add_value(&*TAGS, tags);

        assert_eq!(
            format(&MutableMetadata::new(), &statement),
            r#"hello [CONTEXT canary shard=7 zone="eu" ]"#
        );
    }
}
