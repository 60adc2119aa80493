//! Storage implementations for per-log-site state.
//!
//! Provides concurrent, sharded storage for rate limiter state.

use crate::application::ports::Storage;
use dashmap::DashMap;
use std::hash::Hash;

/// Thread-safe sharded storage backed by DashMap.
///
/// DashMap provides lock-free reads and fine-grained locking for writes, so
/// unrelated log sites never contend on the same lock.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, V>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Insert or update a value.
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    /// Get a reference to a value.
    pub fn get(&self, key: &K) -> Option<dashmap::mapref::one::Ref<'_, K, V>> {
        self.map.get(key)
    }

    /// Check if a key exists.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug,
    V: Send + Sync + std::fmt::Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let entry = self.map.entry(key);
        let mut value_ref = entry.or_insert_with(factory);
        accessor(&mut value_ref)
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.map.retain(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_entry_mut_creates_once() {
        let storage: ShardedStorage<&str, u32> = ShardedStorage::new();

        let first = storage.with_entry_mut("key", || 1, |v| {
            *v += 10;
            *v
        });
        let second = storage.with_entry_mut("key", || 100, |v| *v);

        assert_eq!(first, 11);
        assert_eq!(second, 11);
        assert_eq!(Storage::len(&storage), 1);
    }

    #[test]
    fn test_remove() {
        let storage = ShardedStorage::new();

        storage.insert("key", 100);
        assert!(storage.contains_key(&"key"));

        let removed = Storage::remove(&storage, &"key");
        assert_eq!(removed, Some(100));
        assert!(!storage.contains_key(&"key"));
        assert!(Storage::is_empty(&storage));
    }

    #[test]
    fn test_retain_and_clear() {
        let storage = ShardedStorage::new();
        for i in 0..10_u32 {
            storage.insert(i, i * 2);
        }

        storage.retain(|k, _| k % 2 == 0);
        assert_eq!(Storage::len(&storage), 5);
        assert_eq!(*storage.get(&4).unwrap(), 8);

        Storage::clear(&storage);
        assert!(Storage::is_empty(&storage));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let storage = Arc::new(ShardedStorage::new());
        let mut handles = vec![];

        for i in 0..10 {
            let storage_clone = Arc::clone(&storage);
            let handle = thread::spawn(move || {
                for j in 0..100 {
                    storage_clone.insert(format!("key_{}_{}", i, j), i * 100 + j);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(Storage::len(&*storage), 1000);
    }
}
