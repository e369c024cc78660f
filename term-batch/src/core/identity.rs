//! Partition identities: the structured key extracted from a raw reference.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single value inside a [`PartitionIdentity`].
///
/// Pattern matching always produces [`PartitionValue::Text`]; the other
/// variants come from typed criteria such as `{"id": 3}` in a JSON request.
/// Identities compare values by their text form, so `3` selects `"3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionValue {
    /// Boolean partition value
    Boolean(bool),
    /// Integer partition value
    Integer(i64),
    /// Textual partition value
    Text(String),
}

impl PartitionValue {
    /// Returns the value as text, the form used in reference templates.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Integer(i) => Cow::Owned(i.to_string()),
            Self::Boolean(b) => Cow::Owned(b.to_string()),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PartitionValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Ordered mapping from group name to partition value.
///
/// Group order is preserved for display and serialization (it follows the
/// group names of the pattern that produced the identity), but equality and
/// hashing only consider the set of `(name, text value)` pairs.
///
/// # Example
///
/// ```rust
/// use term_batch::core::PartitionIdentity;
///
/// let identity = PartitionIdentity::new()
///     .with("name", "A")
///     .with("id", "100");
///
/// assert_eq!(identity.get("id").map(|v| v.to_string()), Some("100".to_string()));
/// assert_eq!(identity.to_string(), r#"{"name":"A","id":"100"}"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PartitionIdentity {
    entries: Vec<(String, PartitionValue)>,
}

impl PartitionIdentity {
    /// Creates an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a value, returning the updated identity.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PartitionValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a value in place. A replaced value keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PartitionValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes a value, returning it if it was present.
    pub fn remove(&mut self, key: &str) -> Option<PartitionValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Gets the value for a group name.
    pub fn get(&self, key: &str) -> Option<&PartitionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Checks whether a group name is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over group names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PartitionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of groups in the identity.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the identity has no groups.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if every entry of `subset` is present here with the
    /// same text value.
    ///
    /// An empty subset matches every identity.
    pub fn matches(&self, subset: &PartitionIdentity) -> bool {
        subset
            .iter()
            .all(|(k, v)| self.get(k).is_some_and(|own| own.as_text() == v.as_text()))
    }

    fn sorted_entries(&self) -> Vec<&(String, PartitionValue)> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
    }
}

impl PartialEq for PartitionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.matches(other)
    }
}

impl Eq for PartitionIdentity {}

impl Hash for PartitionIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (k, v) in self.sorted_entries() {
            k.hash(state);
            v.as_text().hash(state);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for PartitionIdentity
where
    K: Into<String>,
    V: Into<PartitionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut identity = Self::new();
        for (k, v) in iter {
            identity.insert(k, v);
        }
        identity
    }
}

impl Serialize for PartitionIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct IdentityVisitor;

impl<'de> Visitor<'de> for IdentityVisitor {
    type Value = PartitionIdentity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of group names to partition values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut identity = PartitionIdentity::new();
        while let Some((key, value)) = access.next_entry::<String, PartitionValue>()? {
            identity.insert(key, value);
        }
        Ok(identity)
    }
}

impl<'de> Deserialize<'de> for PartitionIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(IdentityVisitor)
    }
}

impl fmt::Display for PartitionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.entries),
        }
    }
}
