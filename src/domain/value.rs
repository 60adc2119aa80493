//! Type-erased metadata values.
//!
//! Metadata values are stored behind a shared pointer so that metadata can be
//! merged and handed to backends without cloning user data. Any `Display`
//! type can be a value.

use std::any::Any;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// A value that can be attached to a log statement as metadata.
///
/// Implemented for every `Display + Send + Sync + 'static` type.
pub trait LogValue: fmt::Display + Any + Send + Sync {
    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete type, used in diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T> LogValue for T
where
    T: fmt::Display + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A shared, immutable metadata value.
#[derive(Clone)]
pub struct MetadataValue(Arc<dyn LogValue>);

impl MetadataValue {
    /// Wrap a value.
    pub fn new<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        MetadataValue(Arc::new(value))
    }

    /// Borrow the erased value.
    ///
    /// Always go through this method rather than calling `LogValue` methods on
    /// the inner `Arc`, which is itself a `LogValue`.
    pub fn as_log_value(&self) -> &dyn LogValue {
        &*self.0
    }

    /// Downcast to a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_log_value().as_any().downcast_ref::<T>()
    }

    /// Name of the concrete type of the stored value.
    pub fn type_name(&self) -> &'static str {
        self.as_log_value().type_name()
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &MetadataValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_log_value(), f)
    }
}

impl fmt::Debug for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataValue({}: {})", self.type_name(), safe_to_string(self.as_log_value()))
    }
}

/// Render a value to a string without letting a broken `Display` impl abort
/// the log statement.
///
/// A formatting error or a panic inside `Display::fmt` is replaced by a
/// placeholder naming the value's type and the failure.
pub fn safe_to_string(value: &dyn LogValue) -> String {
    render(&value, value.type_name())
}

/// [`safe_to_string`] for any `Display` type, including borrowed ones such as
/// `fmt::Arguments`.
pub fn safe_display<T: fmt::Display + ?Sized>(value: &T) -> String {
    render(&value, std::any::type_name::<T>())
}

fn render(value: &dyn fmt::Display, type_name: &str) -> String {
    let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut out = String::new();
        write!(out, "{}", value).map(|_| out)
    }));

    match rendered {
        Ok(Ok(text)) => text,
        Ok(Err(fmt::Error)) => format!("{{{}: formatting failed}}", type_name),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            format!("{{{}: panicked while formatting: {}}}", type_name, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDisplay;

    impl fmt::Display for FailingDisplay {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    struct PanickingDisplay;

    impl fmt::Display for PanickingDisplay {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("boom")
        }
    }

    #[test]
    fn test_downcast() {
        let value = MetadataValue::new(42_i64);
        assert_eq!(value.downcast_ref::<i64>(), Some(&42));
        assert!(value.downcast_ref::<i32>().is_none());
        assert_eq!(value.type_name(), "i64");
    }

    #[test]
    fn test_safe_to_string_plain() {
        let value = MetadataValue::new("hello");
        assert_eq!(safe_to_string(value.as_log_value()), "hello");
    }

    #[test]
    fn test_safe_to_string_contains_fmt_error() {
        let text = safe_to_string(&FailingDisplay);
        assert!(text.contains("FailingDisplay"));
        assert!(text.contains("formatting failed"));
    }

    #[test]
    fn test_safe_display_borrowed() {
        let name = String::from("world");
        assert_eq!(safe_display(&format_args!("hello {}", name)), "hello world");
        assert!(safe_display(&PanickingDisplay).contains("boom"));
    }

    #[test]
    fn test_safe_to_string_contains_panic() {
        let text = safe_to_string(&PanickingDisplay);
        assert!(text.contains("PanickingDisplay"));
        assert!(text.contains("boom"));
    }
}
