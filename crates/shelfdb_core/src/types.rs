//! Core type definitions for ShelfDB.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Static, per-entity-type name of a record list.
///
/// One storage identifier always names one record shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(String);

impl StorageId {
    /// Creates a storage identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Top-level partition a record lives under (tenant, user, global, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    /// Creates a collection key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&String> for $name {
            fn from(value: &String) -> Self {
                Self(value.clone())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(StorageId);
string_newtype!(CollectionKey);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn display_is_raw_string() {
        assert_eq!(StorageId::new("scores").to_string(), "scores");
        assert_eq!(CollectionKey::from("g1").to_string(), "g1");
    }

    #[test]
    fn borrowed_lookup() {
        let mut map = BTreeMap::new();
        map.insert(CollectionKey::from("g1"), 1);
        assert_eq!(map.get("g1"), Some(&1));
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&StorageId::new("scores")).unwrap();
        assert_eq!(json, "\"scores\"");
    }
}
