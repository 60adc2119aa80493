//! Tags: named sets of primitive values attached by scoped contexts and
//! statements.
//!
//! Unlike metadata, tags merge by union, so a tag set by an outer context and
//! again by a statement ends up with both values.

use crate::domain::error::LogError;
use crate::domain::metadata_key::check_identifier;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single tag value.
#[derive(Debug, Clone)]
pub enum TagValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value, ordered with `f64::total_cmp`
    Float(f64),
    /// String value
    Str(String),
}

impl TagValue {
    fn rank(&self) -> u8 {
        match self {
            TagValue::Bool(_) => 0,
            TagValue::Int(_) => 1,
            TagValue::Float(_) => 2,
            TagValue::Str(_) => 3,
        }
    }
}

impl Ord for TagValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TagValue::Bool(a), TagValue::Bool(b)) => a.cmp(b),
            (TagValue::Int(a), TagValue::Int(b)) => a.cmp(b),
            (TagValue::Float(a), TagValue::Float(b)) => a.total_cmp(b),
            (TagValue::Str(a), TagValue::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for TagValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TagValue {}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        TagValue::Int(i64::from(v))
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

/// Immutable mapping from tag name to a sorted set of values.
///
/// A name with an empty value set is a value-less tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    map: BTreeMap<String, BTreeSet<TagValue>>,
}

impl Tags {
    /// Tags with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building tags.
    pub fn builder() -> TagsBuilder {
        TagsBuilder::default()
    }

    /// A single tag with one value.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` if `name` is not an identifier.
    pub fn of(name: &str, value: impl Into<TagValue>) -> Result<Self, LogError> {
        Self::builder().add(name, value).build()
    }

    /// Whether there are no tags.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Tag names with their value sets, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<TagValue>)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Values for a tag name.
    pub fn get(&self, name: &str) -> Option<&BTreeSet<TagValue>> {
        self.map.get(name)
    }

    /// Union of both tag sets.
    pub fn merge(&self, other: &Tags) -> Tags {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut map = self.map.clone();
        for (name, values) in &other.map {
            map.entry(name.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        Tags { map }
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[ ")?;
        for (name, values) in &self.map {
            if values.is_empty() {
                write!(f, "{name} ")?;
            }
            for value in values {
                write!(f, "{name}={value} ")?;
            }
        }
        f.write_str("]")
    }
}

/// Builder for [`Tags`]. Name validation is deferred to [`TagsBuilder::build`].
#[derive(Debug, Default)]
pub struct TagsBuilder {
    map: BTreeMap<String, BTreeSet<TagValue>>,
    invalid: Option<String>,
}

impl TagsBuilder {
    /// Add a value-less tag.
    pub fn add_name(mut self, name: &str) -> Self {
        self.remember(name);
        self.map.entry(name.to_string()).or_default();
        self
    }

    /// Add a tag value.
    pub fn add(mut self, name: &str, value: impl Into<TagValue>) -> Self {
        self.remember(name);
        self.map
            .entry(name.to_string())
            .or_default()
            .insert(value.into());
        self
    }

    fn remember(&mut self, name: &str) {
        if self.invalid.is_none() && check_identifier(name).is_err() {
            self.invalid = Some(name.to_string());
        }
    }

    /// Build the tags.
    ///
    /// # Errors
    /// Returns `LogError::InvalidArgument` naming the first invalid tag name.
    pub fn build(self) -> Result<Tags, LogError> {
        match self.invalid {
            Some(name) => Err(LogError::invalid_argument(format!(
                "invalid tag name: {name:?}"
            ))),
            None => Ok(Tags { map: self.map }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sorts_and_dedups() {
        let tags = Tags::builder()
            .add("zone", "b")
            .add("zone", "a")
            .add("zone", "a")
            .add_name("canary")
            .build()
            .unwrap();

        let zone: Vec<_> = tags.get("zone").unwrap().iter().cloned().collect();
        assert_eq!(zone, vec![TagValue::from("a"), TagValue::from("b")]);
        assert!(tags.get("canary").unwrap().is_empty());
        assert_eq!(tags.to_string(), "[ canary zone=a zone=b ]");
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = Tags::builder().add("bad name", 1).build().unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(Tags::of("", true).is_err());
    }

    #[test]
    fn test_merge_is_union() {
        let outer = Tags::builder().add("k", 1).add("only_outer", true).build().unwrap();
        let inner = Tags::builder().add("k", 2).build().unwrap();
        let merged = outer.merge(&inner);

        assert_eq!(merged.get("k").unwrap().len(), 2);
        assert!(merged.get("only_outer").is_some());
        assert_eq!(merged, inner.merge(&outer));
    }

    #[test]
    fn test_mixed_value_ordering() {
        let tags = Tags::builder()
            .add("v", "text")
            .add("v", 1.5)
            .add("v", 7)
            .add("v", false)
            .build()
            .unwrap();
        assert_eq!(tags.to_string(), "[ v=false v=7 v=1.5 v=text ]");
    }

    #[test]
    fn test_float_nan_is_orderable() {
        let tags = Tags::builder()
            .add("f", f64::NAN)
            .add("f", f64::NAN)
            .build()
            .unwrap();
        assert_eq!(tags.get("f").unwrap().len(), 1);
    }
}
