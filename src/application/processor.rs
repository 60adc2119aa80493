//! Merged, read-only view over scope and log-site metadata.
//!
//! A `MetadataProcessor` is built once per emitted statement. Scope entries
//! come before log-site entries. Each distinct key is visited once, in order
//! of first occurrence:
//!
//! - singleton keys resolve to their last value (the log-site value wins),
//! - repeated keys yield every value, scope values first, with no
//!   de-duplication.
//!
//! Small inputs (at most [`MAX_LIGHTWEIGHT_ELEMENTS`] entries) use a bitset
//! index with no heap allocation; larger inputs use a hash map. Both behave
//! identically.

use crate::application::handler::MetadataHandler;
use crate::domain::error::LogError;
use crate::domain::metadata::Metadata;
use crate::domain::metadata_key::{AnyMetadataKey, MetadataKey};
use crate::domain::value::MetadataValue;
use ahash::AHashMap;
use std::fmt;

/// Largest number of entries handled by the bitset index.
pub const MAX_LIGHTWEIGHT_ELEMENTS: usize = 28;

#[derive(Clone, Copy)]
struct Sources<'a> {
    scope: &'a dyn Metadata,
    log_site: &'a dyn Metadata,
}

impl<'a> Sources<'a> {
    fn len(&self) -> usize {
        self.scope.size() + self.log_site.size()
    }

    fn key(&self, index: usize) -> &'a AnyMetadataKey {
        let scope_len = self.scope.size();
        if index < scope_len {
            self.scope.key(index)
        } else {
            self.log_site.key(index - scope_len)
        }
    }

    fn value(&self, index: usize) -> &'a MetadataValue {
        let scope_len = self.scope.size();
        if index < scope_len {
            self.scope.value(index)
        } else {
            self.log_site.value(index - scope_len)
        }
    }
}

/// Entry indices grouped by distinct key, in first-occurrence order.
enum KeyIndex {
    /// One bitmask of entry indices per distinct key.
    Bitset {
        slots: [u32; MAX_LIGHTWEIGHT_ELEMENTS],
        len: usize,
    },
    Map {
        lookup: AHashMap<AnyMetadataKey, usize>,
        slots: Vec<Vec<usize>>,
    },
}

impl KeyIndex {
    fn bitset(sources: Sources<'_>) -> Self {
        let mut slots = [0_u32; MAX_LIGHTWEIGHT_ELEMENTS];
        let mut len = 0;
        for index in 0..sources.len() {
            let key = sources.key(index);
            let existing = slots[..len]
                .iter()
                .position(|mask| sources.key(mask.trailing_zeros() as usize) == key);
            match existing {
                Some(slot) => slots[slot] |= 1 << index,
                None => {
                    slots[len] = 1 << index;
                    len += 1;
                }
            }
        }
        KeyIndex::Bitset { slots, len }
    }

    fn map(sources: Sources<'_>) -> Self {
        let mut lookup: AHashMap<AnyMetadataKey, usize> = AHashMap::new();
        let mut slots: Vec<Vec<usize>> = Vec::new();
        for index in 0..sources.len() {
            let key = sources.key(index);
            match lookup.get(key) {
                Some(&slot) => slots[slot].push(index),
                None => {
                    lookup.insert(key.clone(), slots.len());
                    slots.push(vec![index]);
                }
            }
        }
        KeyIndex::Map { lookup, slots }
    }

    fn len(&self) -> usize {
        match self {
            KeyIndex::Bitset { len, .. } => *len,
            KeyIndex::Map { slots, .. } => slots.len(),
        }
    }

    fn first(&self, slot: usize) -> usize {
        match self {
            KeyIndex::Bitset { slots, .. } => slots[slot].trailing_zeros() as usize,
            KeyIndex::Map { slots, .. } => slots[slot][0],
        }
    }

    fn last(&self, slot: usize) -> usize {
        match self {
            KeyIndex::Bitset { slots, .. } => (31 - slots[slot].leading_zeros()) as usize,
            KeyIndex::Map { slots, .. } => slots[slot][slots[slot].len() - 1],
        }
    }

    fn indices(&self, slot: usize) -> Indices<'_> {
        match self {
            KeyIndex::Bitset { slots, .. } => Indices::Bits(slots[slot]),
            KeyIndex::Map { slots, .. } => Indices::List(slots[slot].iter()),
        }
    }

    fn find(&self, sources: Sources<'_>, key: &AnyMetadataKey) -> Option<usize> {
        match self {
            KeyIndex::Bitset { .. } => (0..self.len()).find(|&slot| sources.key(self.first(slot)) == key),
            KeyIndex::Map { lookup, .. } => lookup.get(key).copied(),
        }
    }
}

enum Indices<'p> {
    Bits(u32),
    List(std::slice::Iter<'p, usize>),
}

impl Iterator for Indices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            Indices::Bits(mask) => {
                if *mask == 0 {
                    return None;
                }
                let index = mask.trailing_zeros() as usize;
                *mask &= *mask - 1;
                Some(index)
            }
            Indices::List(iter) => iter.next().copied(),
        }
    }
}

/// Read-only iterator over the values of a repeated key.
pub struct RepeatedValues<'p> {
    sources: Sources<'p>,
    indices: Indices<'p>,
}

impl<'p> RepeatedValues<'p> {
    /// Always fails: the merged view cannot be modified.
    pub fn remove(&mut self) -> Result<(), LogError> {
        Err(LogError::UnsupportedOperation(
            "repeated metadata values are read-only",
        ))
    }
}

impl<'p> Iterator for RepeatedValues<'p> {
    type Item = &'p MetadataValue;

    fn next(&mut self) -> Option<&'p MetadataValue> {
        let index = self.indices.next()?;
        Some(self.sources.value(index))
    }
}

/// Merged view over scope and log-site metadata.
pub struct MetadataProcessor<'a> {
    sources: Sources<'a>,
    index: KeyIndex,
}

impl<'a> MetadataProcessor<'a> {
    /// Build a processor, choosing the representation by size.
    pub fn for_scope_and_log_site(scope: &'a dyn Metadata, log_site: &'a dyn Metadata) -> Self {
        let sources = Sources { scope, log_site };
        let index = if sources.len() <= MAX_LIGHTWEIGHT_ELEMENTS {
            KeyIndex::bitset(sources)
        } else {
            KeyIndex::map(sources)
        };
        Self { sources, index }
    }

    /// Build a processor with the bitset representation.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if there are more than
    /// [`MAX_LIGHTWEIGHT_ELEMENTS`] entries.
    pub fn lightweight(scope: &'a dyn Metadata, log_site: &'a dyn Metadata) -> Result<Self, LogError> {
        let sources = Sources { scope, log_site };
        if sources.len() > MAX_LIGHTWEIGHT_ELEMENTS {
            return Err(LogError::invalid_argument(format!(
                "too many metadata entries for the lightweight processor: {}",
                sources.len()
            )));
        }
        Ok(Self {
            sources,
            index: KeyIndex::bitset(sources),
        })
    }

    /// Build a processor with the hash map representation.
    pub fn simple(scope: &'a dyn Metadata, log_site: &'a dyn Metadata) -> Self {
        let sources = Sources { scope, log_site };
        Self {
            sources,
            index: KeyIndex::map(sources),
        }
    }

    /// Whether the bitset representation is in use.
    pub fn is_lightweight(&self) -> bool {
        matches!(self.index, KeyIndex::Bitset { .. })
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// Distinct keys in first-occurrence order.
    pub fn key_set(&self) -> Vec<&'a AnyMetadataKey> {
        (0..self.index.len())
            .map(|slot| self.sources.key(self.index.first(slot)))
            .collect()
    }

    /// The value of a singleton key: the last one across scope and log-site
    /// metadata.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` for repeated keys.
    pub fn get_single_value(&self, key: &AnyMetadataKey) -> Result<Option<&'a MetadataValue>, LogError> {
        if key.can_repeat() {
            return Err(LogError::invalid_argument(format!(
                "metadata key '{}' is repeated; use handle() to read its values",
                key.label()
            )));
        }
        Ok(self
            .index
            .find(self.sources, key)
            .map(|slot| self.sources.value(self.index.last(slot))))
    }

    /// Typed form of [`MetadataProcessor::get_single_value`].
    pub fn get_single<T>(&self, key: &MetadataKey<T>) -> Result<Option<&'a T>, LogError>
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        self.get_single_value(key.erased())?
            .map(|value| key.cast(value))
            .transpose()
    }

    /// Call the handler once for every distinct key, in first-occurrence
    /// order.
    pub fn process<C, H>(&self, handler: &H, context: &mut C)
    where
        C: ?Sized,
        H: MetadataHandler<C> + ?Sized,
    {
        for slot in 0..self.index.len() {
            self.dispatch(slot, handler, context);
        }
    }

    /// Call the handler for `key` only, if present.
    pub fn handle<C, H>(&self, key: &AnyMetadataKey, handler: &H, context: &mut C)
    where
        C: ?Sized,
        H: MetadataHandler<C> + ?Sized,
    {
        if let Some(slot) = self.index.find(self.sources, key) {
            self.dispatch(slot, handler, context);
        }
    }

    fn dispatch<C, H>(&self, slot: usize, handler: &H, context: &mut C)
    where
        C: ?Sized,
        H: MetadataHandler<C> + ?Sized,
    {
        let key = self.sources.key(self.index.first(slot));
        if key.can_repeat() {
            let mut values = RepeatedValues {
                sources: self.sources,
                indices: self.index.indices(slot),
            };
            handler.handle_repeated(key, &mut values, context);
        } else {
            handler.handle(key, self.sources.value(self.index.last(slot)), context);
        }
    }
}

impl fmt::Debug for MetadataProcessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataProcessor")
            .field("lightweight", &self.is_lightweight())
            .field("keys", &self.key_set().iter().map(|k| k.label()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metadata::{EmptyMetadata, MutableMetadata};

    struct Collect;

    impl MetadataHandler<Vec<String>> for Collect {
        fn handle(&self, key: &AnyMetadataKey, value: &MetadataValue, out: &mut Vec<String>) {
            out.push(format!("{}={}", key.label(), value));
        }

        fn handle_repeated(
            &self,
            key: &AnyMetadataKey,
            values: &mut RepeatedValues<'_>,
            out: &mut Vec<String>,
        ) {
            let joined: Vec<String> = values.map(|v| v.to_string()).collect();
            out.push(format!("{}={:?}", key.label(), joined));
        }
    }

    fn both<'a>(scope: &'a dyn Metadata, log_site: &'a dyn Metadata) -> [MetadataProcessor<'a>; 2] {
        [
            MetadataProcessor::lightweight(scope, log_site).unwrap(),
            MetadataProcessor::simple(scope, log_site),
        ]
    }

    fn output(processor: &MetadataProcessor<'_>) -> Vec<String> {
        let mut out = Vec::new();
        processor.process(&Collect, &mut out);
        out
    }

    #[test]
    fn test_scope_keys_first() {
        let k1 = MetadataKey::<&str>::single("k1").unwrap();
        let k2 = MetadataKey::<&str>::single("k2").unwrap();
        let k3 = MetadataKey::<&str>::single("k3").unwrap();
        let mut scope = MutableMetadata::new();
        scope.add_value(&k1, "one");
        scope.add_value(&k2, "two");
        let mut log_site = MutableMetadata::new();
        log_site.add_value(&k3, "three");

        for processor in both(&scope, &log_site) {
            assert_eq!(processor.key_count(), 3);
            assert_eq!(processor.key_set(), vec![k1.erased(), k2.erased(), k3.erased()]);
            assert_eq!(output(&processor), vec!["k1=one", "k2=two", "k3=three"]);
        }
    }

    #[test]
    fn test_log_site_overrides_singleton() {
        let k1 = MetadataKey::<&str>::single("k1").unwrap();
        let mut scope = MutableMetadata::new();
        scope.add_value(&k1, "original");
        let mut log_site = MutableMetadata::new();
        log_site.add_value(&k1, "override");

        for processor in both(&scope, &log_site) {
            assert_eq!(processor.key_count(), 1);
            assert_eq!(processor.get_single(&k1).unwrap(), Some(&"override"));
            assert_eq!(output(&processor), vec!["k1=override"]);
        }
    }

    #[test]
    fn test_repeated_values_concatenate() {
        let r1 = MetadataKey::<&str>::repeated("r1").unwrap();
        let mut scope = MutableMetadata::new();
        scope.add_value(&r1, "a");
        scope.add_value(&r1, "b");
        let mut log_site = MutableMetadata::new();
        log_site.add_value(&r1, "c");

        for processor in both(&scope, &log_site) {
            assert_eq!(output(&processor), vec![r#"r1=["a", "b", "c"]"#]);
            assert!(processor.get_single_value(r1.erased()).unwrap_err().is_invalid_argument());
        }
    }

    #[test]
    fn test_repeated_values_are_read_only() {
        struct TryRemove;
        impl MetadataHandler<Vec<LogError>> for TryRemove {
            fn handle(&self, _: &AnyMetadataKey, _: &MetadataValue, _: &mut Vec<LogError>) {}
            fn handle_repeated(
                &self,
                _: &AnyMetadataKey,
                values: &mut RepeatedValues<'_>,
                errors: &mut Vec<LogError>,
            ) {
                values.next();
                errors.extend(values.remove().err());
            }
        }

        let r = MetadataKey::<i32>::repeated("r").unwrap();
        let mut scope = MutableMetadata::new();
        scope.add_value(&r, 1);
        scope.add_value(&r, 2);

        for processor in both(&scope, &EmptyMetadata) {
            let mut errors = Vec::new();
            processor.process(&TryRemove, &mut errors);
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], LogError::UnsupportedOperation(_)));
        }
    }

    #[test]
    fn test_handle_single_key() {
        let a = MetadataKey::<i32>::single("a").unwrap();
        let b = MetadataKey::<i32>::single("b").unwrap();
        let missing = MetadataKey::<i32>::single("missing").unwrap();
        let mut log_site = MutableMetadata::new();
        log_site.add_value(&a, 1);
        log_site.add_value(&b, 2);

        for processor in both(&EmptyMetadata, &log_site) {
            let mut out = Vec::new();
            processor.handle(b.erased(), &Collect, &mut out);
            processor.handle(missing.erased(), &Collect, &mut out);
            assert_eq!(out, vec!["b=2"]);
            assert_eq!(processor.get_single(&missing).unwrap(), None);
        }
    }

    #[test]
    fn test_representation_chosen_by_size() {
        let keys: Vec<MetadataKey<usize>> = (0..30)
            .map(|i| MetadataKey::single(format!("k{i}")).unwrap())
            .collect();
        let mut small = MutableMetadata::new();
        let mut large = MutableMetadata::new();
        for (i, key) in keys.iter().enumerate() {
            if i < MAX_LIGHTWEIGHT_ELEMENTS {
                small.add_value(key, i);
            }
            large.add_value(key, i);
        }

        assert!(MetadataProcessor::for_scope_and_log_site(&EmptyMetadata, &small).is_lightweight());
        assert!(!MetadataProcessor::for_scope_and_log_site(&EmptyMetadata, &large).is_lightweight());
        assert!(MetadataProcessor::lightweight(&EmptyMetadata, &large).is_err());
    }

    #[test]
    fn test_representations_agree_on_mixed_input() {
        let single: Vec<MetadataKey<usize>> = (0..4)
            .map(|i| MetadataKey::single(format!("s{i}")).unwrap())
            .collect();
        let repeated: Vec<MetadataKey<usize>> = (0..3)
            .map(|i| MetadataKey::repeated(format!("r{i}")).unwrap())
            .collect();

        let mut scope = MutableMetadata::new();
        let mut log_site = MutableMetadata::new();
        for i in 0..14 {
            let target = if i % 2 == 0 { &mut scope } else { &mut log_site };
            target.add_value(&single[i % single.len()], i);
            target.add_value(&repeated[i % repeated.len()], i);
        }

        let light = MetadataProcessor::lightweight(&scope, &log_site).unwrap();
        let simple = MetadataProcessor::simple(&scope, &log_site);
        assert_eq!(light.key_count(), simple.key_count());
        assert_eq!(light.key_set(), simple.key_set());
        assert_eq!(output(&light), output(&simple));
        for key in &single {
            assert_eq!(light.get_single(key).unwrap(), simple.get_single(key).unwrap());
        }
    }
}
