//! Typed metadata keys.
//!
//! A key is a label plus a value type. Keys are compared by identity: two keys
//! created with the same label are still different keys. Singleton keys hold
//! at most one value per statement, repeated keys keep every value.

use crate::domain::error::LogError;
use crate::domain::value::{LogValue, MetadataValue};
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum nesting of custom key emission for a single statement. Deeper
/// emission falls back to the default representation.
pub const MAX_CUSTOM_EMIT_DEPTH: usize = 20;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Receiver of the key/value pairs produced when metadata is emitted.
pub trait KeyValueSink {
    /// Handle a single key/value pair.
    fn handle(&mut self, label: &str, value: &dyn LogValue);

    /// Handle a label that carries no value (for example a value-less tag).
    fn handle_name_only(&mut self, label: &str) {
        self.handle(label, &true);
    }
}

/// Current nesting of custom key emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitDepth(usize);

impl EmitDepth {
    /// Depth of a top-level emission.
    pub fn root() -> Self {
        EmitDepth(0)
    }

    /// Current depth.
    pub fn get(&self) -> usize {
        self.0
    }

    fn next(self) -> Self {
        EmitDepth(self.0 + 1)
    }

    fn exhausted(&self) -> bool {
        self.0 >= MAX_CUSTOM_EMIT_DEPTH
    }
}

/// Custom emission logic for a key.
///
/// Implementations may emit any number of pairs, including re-emitting through
/// other keys with [`AnyMetadataKey::emit_at`]; the `depth` they receive must
/// be passed along so runaway recursion is cut off.
pub trait CustomEmitter: Send + Sync {
    /// Emit one value.
    fn emit(
        &self,
        key: &AnyMetadataKey,
        value: &MetadataValue,
        sink: &mut dyn KeyValueSink,
        depth: EmitDepth,
    );

    /// Emit all values of a repeated key. Defaults to emitting them one by one.
    fn emit_repeated(
        &self,
        key: &AnyMetadataKey,
        values: &mut dyn Iterator<Item = &MetadataValue>,
        sink: &mut dyn KeyValueSink,
        depth: EmitDepth,
    ) {
        for value in values {
            self.emit(key, value, sink, depth);
        }
    }
}

/// Adapter turning a typed closure into a [`CustomEmitter`].
struct FnEmitter<T, F> {
    emit: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> CustomEmitter for FnEmitter<T, F>
where
    T: 'static,
    F: Fn(&AnyMetadataKey, &T, &mut dyn KeyValueSink, EmitDepth) + Send + Sync,
{
    fn emit(
        &self,
        key: &AnyMetadataKey,
        value: &MetadataValue,
        sink: &mut dyn KeyValueSink,
        depth: EmitDepth,
    ) {
        match value.downcast_ref::<T>() {
            Some(typed) => (self.emit)(key, typed, sink, depth),
            None => sink.handle(key.label(), value.as_log_value()),
        }
    }
}

struct KeyInner {
    id: u64,
    label: Cow<'static, str>,
    can_repeat: bool,
    value_type: TypeId,
    value_type_name: &'static str,
    emitter: Option<Arc<dyn CustomEmitter>>,
}

/// A metadata key with its value type erased.
///
/// Equality and hashing use key identity, never the label.
#[derive(Clone)]
pub struct AnyMetadataKey(Arc<KeyInner>);

impl AnyMetadataKey {
    /// The key's label, as shown by formatters.
    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Whether the key may hold several values per statement.
    pub fn can_repeat(&self) -> bool {
        self.0.can_repeat
    }

    /// Name of the declared value type.
    pub fn value_type_name(&self) -> &'static str {
        self.0.value_type_name
    }

    /// Unique identity of this key.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Check that a value has this key's declared type.
    pub fn check_value(&self, value: &MetadataValue) -> Result<(), LogError> {
        if value.as_log_value().as_any().type_id() == self.0.value_type {
            Ok(())
        } else {
            Err(self.class_cast(value))
        }
    }

    fn class_cast(&self, value: &MetadataValue) -> LogError {
        LogError::ClassCast {
            label: self.label().to_string(),
            expected: self.0.value_type_name,
            actual: value.type_name(),
        }
    }

    /// Emit a single value to the sink.
    pub fn emit(&self, value: &MetadataValue, sink: &mut dyn KeyValueSink) {
        self.emit_at(value, sink, EmitDepth::root());
    }

    /// Emit a single value from within a custom emitter at the given depth.
    pub fn emit_at(&self, value: &MetadataValue, sink: &mut dyn KeyValueSink, depth: EmitDepth) {
        match &self.0.emitter {
            Some(emitter) if !depth.exhausted() => emitter.emit(self, value, sink, depth.next()),
            _ => sink.handle(self.label(), value.as_log_value()),
        }
    }

    /// Emit every value of a repeated key to the sink.
    pub fn emit_repeated<'v>(
        &self,
        values: &mut dyn Iterator<Item = &'v MetadataValue>,
        sink: &mut dyn KeyValueSink,
    ) {
        self.emit_repeated_at(values, sink, EmitDepth::root());
    }

    /// Emit every value of a repeated key from within a custom emitter.
    pub fn emit_repeated_at<'v>(
        &self,
        values: &mut dyn Iterator<Item = &'v MetadataValue>,
        sink: &mut dyn KeyValueSink,
        depth: EmitDepth,
    ) {
        match &self.0.emitter {
            Some(emitter) if !depth.exhausted() => {
                emitter.emit_repeated(self, values, sink, depth.next())
            }
            _ => {
                for value in values {
                    sink.handle(self.label(), value.as_log_value());
                }
            }
        }
    }
}

impl PartialEq for AnyMetadataKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AnyMetadataKey {}

impl Hash for AnyMetadataKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.id);
    }
}

impl fmt::Debug for AnyMetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataKey")
            .field("label", &self.label())
            .field("can_repeat", &self.can_repeat())
            .field("type", &self.0.value_type_name)
            .finish()
    }
}

impl fmt::Display for AnyMetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A metadata key whose values have type `T`.
pub struct MetadataKey<T> {
    key: AnyMetadataKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T>
where
    T: fmt::Display + Send + Sync + 'static,
{
    /// Create a key holding at most one value per statement.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `label` is not an identifier.
    pub fn single(label: impl Into<Cow<'static, str>>) -> Result<Self, LogError> {
        Self::checked(label.into(), false, None)
    }

    /// Create a key that may hold several values per statement.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `label` is not an identifier.
    pub fn repeated(label: impl Into<Cow<'static, str>>) -> Result<Self, LogError> {
        Self::checked(label.into(), true, None)
    }

    /// Create a key with custom emission logic.
    ///
    /// The closure receives the key, the typed value, the sink and the current
    /// emission depth. Values of the wrong type are emitted with the default
    /// representation.
    pub fn with_emitter<F>(
        label: impl Into<Cow<'static, str>>,
        can_repeat: bool,
        emit: F,
    ) -> Result<Self, LogError>
    where
        F: Fn(&AnyMetadataKey, &T, &mut dyn KeyValueSink, EmitDepth) + Send + Sync + 'static,
    {
        let emitter: Arc<dyn CustomEmitter> = Arc::new(FnEmitter {
            emit,
            _marker: PhantomData,
        });
        Self::checked(label.into(), can_repeat, Some(emitter))
    }

    /// Create a key with a full [`CustomEmitter`] implementation.
    pub fn with_custom_emitter(
        label: impl Into<Cow<'static, str>>,
        can_repeat: bool,
        emitter: Arc<dyn CustomEmitter>,
    ) -> Result<Self, LogError> {
        Self::checked(label.into(), can_repeat, Some(emitter))
    }

    fn checked(
        label: Cow<'static, str>,
        can_repeat: bool,
        emitter: Option<Arc<dyn CustomEmitter>>,
    ) -> Result<Self, LogError> {
        check_identifier(&label)?;
        Ok(Self::build(label, can_repeat, emitter))
    }

    /// Build a key from a label known to be valid.
    pub(crate) fn build(
        label: Cow<'static, str>,
        can_repeat: bool,
        emitter: Option<Arc<dyn CustomEmitter>>,
    ) -> Self {
        MetadataKey {
            key: AnyMetadataKey(Arc::new(KeyInner {
                id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
                label,
                can_repeat,
                value_type: TypeId::of::<T>(),
                value_type_name: std::any::type_name::<T>(),
                emitter,
            })),
            _marker: PhantomData,
        }
    }

    /// Cast an erased value to this key's type.
    ///
    /// # Errors
    /// Returns `LogError::ClassCast` if the value has a different type.
    pub fn cast<'v>(&self, value: &'v MetadataValue) -> Result<&'v T, LogError> {
        value
            .downcast_ref::<T>()
            .ok_or_else(|| self.key.class_cast(value))
    }

    /// The type-erased key.
    pub fn erased(&self) -> &AnyMetadataKey {
        &self.key
    }
}

impl<T> Clone for MetadataKey<T> {
    fn clone(&self) -> Self {
        MetadataKey {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for MetadataKey<T> {
    type Target = AnyMetadataKey;

    fn deref(&self) -> &AnyMetadataKey {
        &self.key
    }
}

impl<T> fmt::Debug for MetadataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.key, f)
    }
}

impl<T> PartialEq for MetadataKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for MetadataKey<T> {}

/// Validate a metadata identifier: an ASCII letter followed by ASCII letters,
/// digits or underscores.
pub fn check_identifier(label: &str) -> Result<(), LogError> {
    let mut chars = label.chars();
    match chars.next() {
        None => return Err(LogError::invalid_argument("identifier must not be empty")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(LogError::invalid_argument(format!(
                "identifier must start with an ASCII letter: {label:?}"
            )))
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(LogError::invalid_argument(format!(
            "identifier contains invalid character {bad:?}: {label:?}"
        )));
    }
    Ok(())
}
