//! Bucketing strategies for `per(...)` aggregation.
//!
//! A strategy maps a value from a possibly unbounded domain to a qualifier
//! from a bounded set, so per-value rate limiting cannot grow state without
//! limit. A strategy returning `None` leaves the log-site key unspecialized.

use crate::domain::error::LogError;
use crate::domain::log_site::Qualifier;
use ahash::{AHashSet, AHasher};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Maps values to aggregation buckets.
pub struct BucketingStrategy<T: ?Sized> {
    name: &'static str,
    apply: Arc<dyn Fn(&T) -> Option<Qualifier> + Send + Sync>,
}

impl<T: ?Sized> BucketingStrategy<T> {
    /// Use an arbitrary mapping. The closure must return qualifiers from a
    /// bounded set.
    pub fn custom<F>(apply: F) -> Self
    where
        F: Fn(&T) -> Option<Qualifier> + Send + Sync + 'static,
    {
        Self {
            name: "custom",
            apply: Arc::new(apply),
        }
    }

    /// The bucket for `value`, if any.
    pub fn apply(&self, value: &T) -> Option<Qualifier> {
        (self.apply)(value)
    }
}

impl<T> BucketingStrategy<T>
where
    T: Eq + Hash + fmt::Debug + Clone + Send + Sync + 'static,
{
    /// Every value is its own bucket. Only for types with few values, such
    /// as enums.
    pub fn known_bounded() -> Self {
        Self {
            name: "known_bounded",
            apply: Arc::new(|value: &T| Some(Qualifier::value(value.clone()))),
        }
    }

    /// Known values are their own bucket; any other value is not bucketed.
    pub fn for_known_keys(keys: impl IntoIterator<Item = T>) -> Self {
        let known: AHashSet<T> = keys.into_iter().collect();
        Self {
            name: "for_known_keys",
            apply: Arc::new(move |value: &T| {
                known
                    .get(value)
                    .map(|known| Qualifier::value(known.clone()))
            }),
        }
    }
}

impl<T> BucketingStrategy<T>
where
    T: Hash + ?Sized + 'static,
{
    /// Bucket by hash into `max_buckets` buckets numbered from 0.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `max_buckets` is 0.
    pub fn by_hash(max_buckets: u32) -> Result<Self, LogError> {
        if max_buckets == 0 {
            return Err(LogError::invalid_argument("max_buckets must be positive"));
        }
        Ok(Self {
            name: "by_hash",
            apply: Arc::new(move |value: &T| {
                let mut hasher = AHasher::default();
                value.hash(&mut hasher);
                let bucket = (hasher.finish() % u64::from(max_buckets)) as u32;
                Some(Qualifier::value(bucket))
            }),
        })
    }
}

impl<T: ?Sized> Clone for BucketingStrategy<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T: ?Sized> fmt::Debug for BucketingStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketingStrategy({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Region {
        Eu,
        Us,
    }

    #[test]
    fn test_known_bounded() {
        let strategy = BucketingStrategy::known_bounded();
        assert_eq!(strategy.apply(&Region::Eu), Some(Qualifier::value(Region::Eu)));
        assert_ne!(strategy.apply(&Region::Eu), strategy.apply(&Region::Us));
    }

    #[test]
    fn test_for_known_keys() {
        let strategy = BucketingStrategy::for_known_keys(["GET".to_string(), "POST".to_string()]);
        assert_eq!(
            strategy.apply(&"GET".to_string()),
            Some(Qualifier::value("GET".to_string()))
        );
        assert_eq!(strategy.apply(&"PATCH".to_string()), None);
    }

    #[test]
    fn test_by_hash_is_bounded_and_stable() {
        let strategy = BucketingStrategy::<str>::by_hash(4).unwrap();
        let buckets: AHashSet<u32> = (0..200)
            .filter_map(|i| strategy.apply(&format!("user-{i}")))
            .map(|q| match q {
                Qualifier::Value(v) => *v.as_any().downcast_ref::<u32>().unwrap(),
                Qualifier::Scope(_) => unreachable!(),
            })
            .collect();
        assert!(buckets.iter().all(|b| *b < 4));
        assert_eq!(strategy.apply("user-7"), strategy.apply("user-7"));
        assert!(BucketingStrategy::<str>::by_hash(0).is_err());
    }

    #[test]
    fn test_custom() {
        let strategy = BucketingStrategy::custom(|status: &u16| {
            Some(Qualifier::value(if *status >= 500 { "server" } else { "client" }))
        });
        assert_eq!(strategy.apply(&503), Some(Qualifier::value("server")));
        assert_eq!(strategy.apply(&404), Some(Qualifier::value("client")));
    }
}
