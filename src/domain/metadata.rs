//! Ordered key/value metadata attached to log statements and scopes.
//!
//! Metadata is a plain sequence of `(key, value)` pairs. Insertion order is
//! iteration order, and duplicate entries for singleton keys are tolerated at
//! this layer; the merged view in the processor resolves them.

use crate::domain::error::LogError;
use crate::domain::metadata_key::{AnyMetadataKey, MetadataKey};
use crate::domain::value::MetadataValue;
use std::fmt;

/// Read-only indexed view of metadata entries.
///
/// `key(n)` and `value(n)` panic if `n >= size()`, like slice indexing.
pub trait Metadata: Send + Sync {
    /// Number of entries.
    fn size(&self) -> usize;

    /// Key of the `n`th entry.
    fn key(&self, n: usize) -> &AnyMetadataKey;

    /// Value of the `n`th entry.
    fn value(&self, n: usize) -> &MetadataValue;

    /// Find the value for `key`: the last one for singleton keys, the first
    /// one for repeated keys.
    fn find_erased(&self, key: &AnyMetadataKey) -> Option<&MetadataValue> {
        let mut found = None;
        for n in 0..self.size() {
            if self.key(n) == key {
                found = Some(self.value(n));
                if key.can_repeat() {
                    break;
                }
            }
        }
        found
    }
}

impl<'a> dyn Metadata + 'a {
    /// Typed lookup, see [`Metadata::find_erased`].
    ///
    /// # Errors
    /// Returns `LogError::ClassCast` if the stored value has the wrong type.
    pub fn find_value<T>(&self, key: &MetadataKey<T>) -> Result<Option<&T>, LogError>
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        self.find_erased(key.erased())
            .map(|value| key.cast(value))
            .transpose()
    }

    /// Iterate over all entries in order.
    pub fn entries(&self) -> impl Iterator<Item = (&AnyMetadataKey, &MetadataValue)> + '_ {
        (0..self.size()).map(move |n| (self.key(n), self.value(n)))
    }
}

/// Metadata with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMetadata;

impl Metadata for EmptyMetadata {
    fn size(&self) -> usize {
        0
    }

    fn key(&self, n: usize) -> &AnyMetadataKey {
        panic!("index {n} out of bounds for empty metadata")
    }

    fn value(&self, n: usize) -> &MetadataValue {
        panic!("index {n} out of bounds for empty metadata")
    }
}

/// Growable metadata owned by a log statement or a scoped context.
#[derive(Clone, Default)]
pub struct MutableMetadata {
    entries: Vec<(AnyMetadataKey, MetadataValue)>,
}

impl MutableMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed value.
    ///
    /// A singleton key that is already present has its value replaced in
    /// place; repeated keys append.
    pub fn add_value<T>(&mut self, key: &MetadataKey<T>, value: T)
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        self.insert(key.erased().clone(), MetadataValue::new(value));
    }

    /// Add an already-erased value.
    ///
    /// # Errors
    /// Returns `LogError::ClassCast` if the value does not have the key's type.
    pub fn add_erased(&mut self, key: &AnyMetadataKey, value: MetadataValue) -> Result<(), LogError> {
        key.check_value(&value)?;
        self.insert(key.clone(), value);
        Ok(())
    }

    fn insert(&mut self, key: AnyMetadataKey, value: MetadataValue) {
        if !key.can_repeat() {
            if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    /// Append every entry of `other`, with the same replacement rules as
    /// [`MutableMetadata::add_value`].
    pub fn extend_from(&mut self, other: &dyn Metadata) {
        for n in 0..other.size() {
            self.insert(other.key(n).clone(), other.value(n).clone());
        }
    }

    /// Remove every value for `key`.
    pub fn remove_all_values(&mut self, key: &AnyMetadataKey) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&AnyMetadataKey, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl Metadata for MutableMetadata {
    fn size(&self) -> usize {
        self.entries.len()
    }

    fn key(&self, n: usize) -> &AnyMetadataKey {
        &self.entries[n].0
    }

    fn value(&self, n: usize) -> &MetadataValue {
        &self.entries[n].1
    }
}

impl fmt::Debug for MutableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(k, v)| format!("{}={}", k.label(), v)))
            .finish()
    }
}
