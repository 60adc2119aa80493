//! Callbacks for consuming merged metadata.
//!
//! [`MetadataHandler`] is the visitor passed to
//! [`MetadataProcessor::process`](crate::application::processor::MetadataProcessor::process).
//! [`MapBasedHandler`] dispatches to per-key callbacks registered through
//! its builder, falling back to default callbacks for other keys.

use crate::application::processor::RepeatedValues;
use crate::domain::error::LogError;
use crate::domain::metadata_key::{AnyMetadataKey, KeyValueSink, MetadataKey};
use crate::domain::value::MetadataValue;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// Visitor for merged metadata.
pub trait MetadataHandler<C: ?Sized> {
    /// Handle the value of a singleton key.
    fn handle(&self, key: &AnyMetadataKey, value: &MetadataValue, context: &mut C);

    /// Handle all values of a repeated key. Defaults to calling
    /// [`MetadataHandler::handle`] once per value.
    fn handle_repeated(&self, key: &AnyMetadataKey, values: &mut RepeatedValues<'_>, context: &mut C) {
        for value in values {
            self.handle(key, value, context);
        }
    }
}

/// Handler that emits every key through its own emission logic.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyEmitter;

impl<'s> MetadataHandler<dyn KeyValueSink + 's> for KeyEmitter {
    fn handle(&self, key: &AnyMetadataKey, value: &MetadataValue, sink: &mut (dyn KeyValueSink + 's)) {
        key.emit(value, sink);
    }

    fn handle_repeated(
        &self,
        key: &AnyMetadataKey,
        values: &mut RepeatedValues<'_>,
        sink: &mut (dyn KeyValueSink + 's),
    ) {
        key.emit_repeated(values, sink);
    }
}

/// Callback for a single value.
pub type ValueHandler<C> = Arc<dyn Fn(&AnyMetadataKey, &MetadataValue, &mut C) + Send + Sync>;

/// Callback for all values of a repeated key.
pub type RepeatedValueHandler<C> =
    Arc<dyn Fn(&AnyMetadataKey, &mut RepeatedValues<'_>, &mut C) + Send + Sync>;

/// A handler dispatching on the key.
pub struct MapBasedHandler<C: ?Sized + 'static> {
    value_handlers: AHashMap<AnyMetadataKey, ValueHandler<C>>,
    repeated_handlers: AHashMap<AnyMetadataKey, RepeatedValueHandler<C>>,
    default_value: ValueHandler<C>,
    default_repeated: Option<RepeatedValueHandler<C>>,
}

impl<C: ?Sized + 'static> MapBasedHandler<C> {
    /// Start building a handler.
    pub fn builder() -> MetadataHandlerBuilder<C> {
        MetadataHandlerBuilder::new()
    }
}

impl<C: ?Sized + 'static> MetadataHandler<C> for MapBasedHandler<C> {
    fn handle(&self, key: &AnyMetadataKey, value: &MetadataValue, context: &mut C) {
        let handler = self.value_handlers.get(key).unwrap_or(&self.default_value);
        handler(key, value, context);
    }

    fn handle_repeated(&self, key: &AnyMetadataKey, values: &mut RepeatedValues<'_>, context: &mut C) {
        if let Some(handler) = self.repeated_handlers.get(key) {
            return handler(key, values, context);
        }
        // A per-key value handler takes precedence over the repeated default.
        if let Some(handler) = self.value_handlers.get(key) {
            for value in values {
                handler(key, value, context);
            }
            return;
        }
        match &self.default_repeated {
            Some(handler) => handler(key, values, context),
            None => {
                for value in values {
                    (self.default_value)(key, value, context);
                }
            }
        }
    }
}

impl<C: ?Sized + 'static> fmt::Debug for MapBasedHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBasedHandler")
            .field("value_handlers", &self.value_handlers.len())
            .field("repeated_handlers", &self.repeated_handlers.len())
            .field("has_default_repeated", &self.default_repeated.is_some())
            .finish()
    }
}

/// Builder for [`MapBasedHandler`].
pub struct MetadataHandlerBuilder<C: ?Sized + 'static> {
    value_handlers: AHashMap<AnyMetadataKey, ValueHandler<C>>,
    repeated_handlers: AHashMap<AnyMetadataKey, RepeatedValueHandler<C>>,
    default_value: Option<ValueHandler<C>>,
    default_repeated: Option<RepeatedValueHandler<C>>,
}

impl<C: ?Sized + 'static> MetadataHandlerBuilder<C> {
    fn new() -> Self {
        Self {
            value_handlers: AHashMap::new(),
            repeated_handlers: AHashMap::new(),
            default_value: None,
            default_repeated: None,
        }
    }

    /// Handler for keys without a specific handler. Required.
    pub fn with_default_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AnyMetadataKey, &MetadataValue, &mut C) + Send + Sync + 'static,
    {
        self.default_value = Some(Arc::new(handler));
        self
    }

    /// Handler for repeated keys without a specific handler. Without one,
    /// repeated values go to the default value handler one at a time.
    pub fn with_default_repeated_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AnyMetadataKey, &mut RepeatedValues<'_>, &mut C) + Send + Sync + 'static,
    {
        self.default_repeated = Some(Arc::new(handler));
        self
    }

    /// Typed handler for one key, called once per value.
    pub fn add_handler<T, F>(mut self, key: &MetadataKey<T>, handler: F) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
        F: Fn(&MetadataKey<T>, &T, &mut C) + Send + Sync + 'static,
    {
        let typed = key.clone();
        let erased: ValueHandler<C> = Arc::new(move |_: &AnyMetadataKey, value: &MetadataValue, context: &mut C| {
            match typed.cast(value) {
                Ok(value) => handler(&typed, value, context),
                Err(err) => tracing::debug!(error = %err, "metadata handler skipped mistyped value"),
            }
        });
        self.repeated_handlers.remove(key.erased());
        self.value_handlers.insert(key.erased().clone(), erased);
        self
    }

    /// Handler for all values of one repeated key.
    pub fn add_repeated_handler<T, F>(mut self, key: &MetadataKey<T>, handler: F) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
        F: Fn(&AnyMetadataKey, &mut RepeatedValues<'_>, &mut C) + Send + Sync + 'static,
    {
        self.value_handlers.remove(key.erased());
        self.repeated_handlers
            .insert(key.erased().clone(), Arc::new(handler));
        self
    }

    /// Ignore every value of the given keys.
    pub fn ignoring<'k>(mut self, keys: impl IntoIterator<Item = &'k AnyMetadataKey>) -> Self {
        for key in keys {
            self.repeated_handlers.remove(key);
            self.value_handlers
                .insert(key.clone(), Arc::new(|_: &AnyMetadataKey, _: &MetadataValue, _: &mut C| {}));
        }
        self
    }

    /// Remove any handler registered for `key`, restoring the defaults.
    pub fn remove_handlers(mut self, key: &AnyMetadataKey) -> Self {
        self.value_handlers.remove(key);
        self.repeated_handlers.remove(key);
        self
    }

    /// Build the handler.
    ///
    /// # Errors
    /// Returns `LogError::NullReference` if no default handler was set.
    pub fn build(self) -> Result<MapBasedHandler<C>, LogError> {
        let default_value = self
            .default_value
            .ok_or(LogError::NullReference("default metadata handler"))?;
        Ok(MapBasedHandler {
            value_handlers: self.value_handlers,
            repeated_handlers: self.repeated_handlers,
            default_value,
            default_repeated: self.default_repeated,
        })
    }
}
