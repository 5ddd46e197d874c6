//! Tag sets attached to OpenTSDB data points

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Replacement for bytes OpenTSDB does not accept in tag keys and values
pub const REPLACEMENT_BYTE: u8 = b'_';

/// Check whether a byte is accepted as-is by OpenTSDB
pub fn is_allowed_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/')
}

/// Replace every byte outside `[A-Za-z0-9-_./]` with an underscore.
///
/// Works on UTF-8 bytes: a multi-byte character such as `é` becomes one
/// underscore per byte. The output is ASCII with the input's byte length.
pub fn normalize(s: &str) -> String {
    if s.bytes().all(is_allowed_byte) {
        return s.to_string();
    }

    s.bytes()
        .map(|b| {
            if is_allowed_byte(b) {
                char::from(b)
            } else {
                char::from(REPLACEMENT_BYTE)
            }
        })
        .collect()
}

/// A set of normalized tag key-value pairs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: BTreeMap<String, String>,
}

impl TagSet {
    /// Create a new empty tag set
    pub fn new() -> Self {
        Self {
            tags: BTreeMap::new(),
        }
    }

    /// Insert a pair, normalizing both sides. Returns the replaced value, if any.
    pub fn insert_normalized(&mut self, key: &str, value: &str) -> Option<String> {
        self.tags.insert(normalize(key), normalize(value))
    }

    /// Get a tag value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Check if a tag key exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Get the number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if the tag set is empty
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over tag key-value pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.insert_normalized(k.as_ref(), v.as_ref());
        }
        tags
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", pairs.join(" "))
    }
}
