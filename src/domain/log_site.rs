//! Log sites and log-site keys.
//!
//! A [`LogSite`] is the source location of a logging call. A [`LogSiteKey`]
//! identifies the rate limiter state used by one invocation: the log site
//! alone, or the log site specialized by one or more qualifiers added with
//! `per(...)`.
//!
//! Specialization is order-sensitive for equality but not for hashing:
//! `hash(specialize(k, q)) == hash(k) ^ hash(q)`, so keys specialized by the
//! same qualifiers in a different order hash alike but compare unequal.

use crate::domain::scope::WeakScope;
use ahash::AHasher;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Source location of a logging call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogSite {
    file: &'static str,
    line: u32,
    column: u32,
}

impl LogSite {
    /// A log site that could not be determined. Statements with an invalid
    /// site skip rate limiting.
    pub const INVALID: LogSite = LogSite {
        file: "",
        line: 0,
        column: 0,
    };

    /// Create a log site from explicit coordinates.
    pub const fn new(file: &'static str, line: u32, column: u32) -> Self {
        LogSite { file, line, column }
    }

    /// The location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        LogSite {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Source file.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Line number, starting at 1.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column number, starting at 1.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Whether this is a real location.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for LogSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            f.write_str("<unknown>")
        }
    }
}

/// A value usable as a `per(...)` qualifier.
///
/// Implemented for every `Eq + Hash + Debug + Send + Sync + 'static` type.
pub trait QualifierValue: fmt::Debug + Send + Sync + 'static {
    /// Upcast for type-aware comparison.
    fn as_any(&self) -> &dyn Any;
    /// Equality across erased values; values of different types are unequal.
    fn dyn_eq(&self, other: &dyn QualifierValue) -> bool;
    /// Process-stable hash of the value.
    fn dyn_hash(&self) -> u64;
}

impl<T> QualifierValue for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn QualifierValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// One specialization step of a log-site key.
#[derive(Clone)]
pub enum Qualifier {
    /// Aggregate per distinct value
    Value(Arc<dyn QualifierValue>),
    /// Aggregate per scope; state is dropped when the scope closes
    Scope(WeakScope),
}

impl Qualifier {
    /// Qualifier for a plain value.
    pub fn value<T>(value: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Qualifier::Value(Arc::new(value))
    }

    fn hash_code(&self) -> u64 {
        match self {
            Qualifier::Value(value) => value.dyn_hash(),
            Qualifier::Scope(scope) => {
                let mut hasher = AHasher::default();
                scope.hash(&mut hasher);
                hasher.finish()
            }
        }
    }
}

impl PartialEq for Qualifier {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Qualifier::Value(a), Qualifier::Value(b)) => a.dyn_eq(&**b),
            (Qualifier::Scope(a), Qualifier::Scope(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Qualifier {}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Value(value) => fmt::Debug::fmt(&**value, f),
            Qualifier::Scope(scope) => fmt::Debug::fmt(scope, f),
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Value(value) => write!(f, "{:?}", value),
            Qualifier::Scope(scope) => f.write_str(scope.label()),
        }
    }
}

enum KeyNode {
    Site {
        site: LogSite,
        hash: u64,
    },
    Specialized {
        delegate: LogSiteKey,
        qualifier: Qualifier,
        hash: u64,
    },
}

/// Identity of the rate limiter state for an invocation.
#[derive(Clone)]
pub struct LogSiteKey(Arc<KeyNode>);

impl LogSiteKey {
    /// Key for an unspecialized log site.
    pub fn for_site(site: LogSite) -> Self {
        let mut hasher = AHasher::default();
        site.hash(&mut hasher);
        LogSiteKey(Arc::new(KeyNode::Site {
            site,
            hash: hasher.finish(),
        }))
    }

    /// Specialize `self` by one more qualifier.
    pub fn specialize(&self, qualifier: Qualifier) -> Self {
        let hash = self.hash_code() ^ qualifier.hash_code();
        LogSiteKey(Arc::new(KeyNode::Specialized {
            delegate: self.clone(),
            qualifier,
            hash,
        }))
    }

    /// The key's hash.
    pub fn hash_code(&self) -> u64 {
        match &*self.0 {
            KeyNode::Site { hash, .. } | KeyNode::Specialized { hash, .. } => *hash,
        }
    }

    /// The underlying log site.
    pub fn log_site(&self) -> LogSite {
        let mut node = &*self.0;
        loop {
            match node {
                KeyNode::Site { site, .. } => return *site,
                KeyNode::Specialized { delegate, .. } => node = &*delegate.0,
            }
        }
    }

    /// Whether this key has been specialized.
    pub fn is_specialized(&self) -> bool {
        matches!(&*self.0, KeyNode::Specialized { .. })
    }

    /// Qualifiers in the order they were applied.
    pub fn qualifiers(&self) -> Vec<Qualifier> {
        let mut out = Vec::new();
        let mut node = &*self.0;
        while let KeyNode::Specialized {
            delegate,
            qualifier,
            ..
        } = node
        {
            out.push(qualifier.clone());
            node = &*delegate.0;
        }
        out.reverse();
        out
    }

    /// Scopes this key is specialized by.
    pub fn scopes(&self) -> Vec<WeakScope> {
        self.qualifiers()
            .into_iter()
            .filter_map(|q| match q {
                Qualifier::Scope(scope) => Some(scope),
                Qualifier::Value(_) => None,
            })
            .collect()
    }
}

impl PartialEq for LogSiteKey {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (KeyNode::Site { site: a, .. }, KeyNode::Site { site: b, .. }) => a == b,
            (
                KeyNode::Specialized {
                    delegate: da,
                    qualifier: qa,
                    hash: ha,
                },
                KeyNode::Specialized {
                    delegate: db,
                    qualifier: qb,
                    hash: hb,
                },
            ) => ha == hb && qa == qb && da == db,
            _ => false,
        }
    }
}

impl Eq for LogSiteKey {}

impl Hash for LogSiteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for LogSiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogSiteKey({self})")
    }
}

impl fmt::Display for LogSiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_site())?;
        let qualifiers = self.qualifiers();
        if !qualifiers.is_empty() {
            f.write_str(" per [")?;
            for (i, q) in qualifiers.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{q}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::LoggingScope;

    fn site(line: u32) -> LogSite {
        LogSite::new("src/service.rs", line, 9)
    }

    #[test]
    fn test_same_site_equal() {
        let a = LogSiteKey::for_site(site(10));
        let b = LogSiteKey::for_site(site(10));
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a, LogSiteKey::for_site(site(11)));
    }

    #[test]
    fn test_caller_captures_location() {
        let here = LogSite::caller();
        assert_eq!(here.file(), file!());
        assert_eq!(here.line(), line!() - 2);
        assert!(here.is_valid());
        assert!(!LogSite::INVALID.is_valid());
    }

    #[test]
    fn test_specialization_order_matters_for_equality_only() {
        let base = LogSiteKey::for_site(site(20));
        let foo_bar = base
            .specialize(Qualifier::value("foo"))
            .specialize(Qualifier::value("bar"));
        let bar_foo = base
            .specialize(Qualifier::value("bar"))
            .specialize(Qualifier::value("foo"));

        assert_ne!(foo_bar, bar_foo);
        assert_eq!(foo_bar.hash_code(), bar_foo.hash_code());
    }

    #[test]
    fn test_bare_key_never_equals_specialized() {
        let base = LogSiteKey::for_site(site(30));
        let specialized = base.specialize(Qualifier::value(1_u32));
        assert_ne!(base, specialized);
        assert_ne!(specialized, base);
        assert_eq!(specialized.log_site(), site(30));
    }

    #[test]
    fn test_equal_specializations() {
        let base = LogSiteKey::for_site(site(40));
        let a = base.specialize(Qualifier::value("user-1"));
        let b = LogSiteKey::for_site(site(40)).specialize(Qualifier::value("user-1"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_qualifier_types_do_not_mix() {
        assert_ne!(Qualifier::value(1_u32), Qualifier::value(1_u64));
        assert_eq!(Qualifier::value(String::from("x")), Qualifier::value(String::from("x")));
    }

    #[test]
    fn test_scopes_collected_in_order() {
        let outer = LoggingScope::create("outer");
        let inner = LoggingScope::create("inner");
        let key = LogSiteKey::for_site(site(50))
            .specialize(Qualifier::Scope(outer.downgrade()))
            .specialize(Qualifier::value(7_i32))
            .specialize(Qualifier::Scope(inner.downgrade()));

        let scopes = key.scopes();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].id(), outer.id());
        assert_eq!(scopes[1].id(), inner.id());
        assert_eq!(key.to_string(), format!("{} per [outer, 7, inner]", site(50)));
    }
}
