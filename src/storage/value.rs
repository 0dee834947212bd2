//! Value types for storage engine
//!
//! Defines all Redis-compatible data types stored under a key.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::storage::sorted_set::SortedSet;
use crate::storage::stream::Stream;

/// All possible Redis value types
#[derive(Debug, Clone)]
pub enum Value {
    /// String value (bytes)
    String(Vec<u8>),

    /// List value (ordered collection)
    List(VecDeque<Vec<u8>>),

    /// Set value (unordered unique collection)
    Set(HashSet<Vec<u8>>),

    /// Hash value (field-value pairs)
    Hash(HashMap<Vec<u8>, Vec<u8>>),

    /// Sorted set value
    SortedSet(SortedSet),

    /// Stream value
    Stream(Stream),
}

/// Value type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    List,
    Set,
    Hash,
    SortedSet,
    Stream,
}

/// A stored entry with value and expiry
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The actual value
    pub value: Value,

    /// Absolute expiry time in milliseconds, if any
    pub expires_at: Option<u64>,
}

impl Value {
    /// Get the type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Set(_) => ValueType::Set,
            Value::Hash(_) => ValueType::Hash,
            Value::SortedSet(_) => ValueType::SortedSet,
            Value::Stream(_) => ValueType::Stream,
        }
    }

    /// Create a string value from bytes
    pub fn string<T: Into<Vec<u8>>>(data: T) -> Self {
        Value::String(data.into())
    }

    /// Whether this is an emptied collection that must not stay in the keyspace.
    /// Streams are kept when empty.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::SortedSet(zset) => zset.is_empty(),
            Value::String(_) | Value::Stream(_) => false,
        }
    }
}

impl ValueType {
    /// Name reported by TYPE
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::Hash => "hash",
            ValueType::SortedSet => "zset",
            ValueType::Stream => "stream",
        }
    }
}

impl StoredValue {
    /// Create a new stored value without expiry
    pub fn new(value: Value) -> Self {
        StoredValue { value, expires_at: None }
    }

    /// Create a new stored value with an absolute expiry
    pub fn with_expiry(value: Value, expires_at: Option<u64>) -> Self {
        StoredValue { value, expires_at }
    }

    /// Check if value has expired at `now_ms`
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::string("x").value_type().as_str(), "string");
        assert_eq!(Value::SortedSet(SortedSet::new()).value_type().as_str(), "zset");
        assert_eq!(Value::Stream(Stream::new()).value_type(), ValueType::Stream);
    }

    #[test]
    fn test_empty_collections() {
        assert!(Value::List(VecDeque::new()).is_empty_collection());
        assert!(!Value::Stream(Stream::new()).is_empty_collection());
        assert!(!Value::string("").is_empty_collection());
    }

    #[test]
    fn test_expiry() {
        let stored = StoredValue::with_expiry(Value::string("v"), Some(100));
        assert!(!stored.is_expired(99));
        assert!(stored.is_expired(100));
        assert!(!StoredValue::new(Value::string("v")).is_expired(u64::MAX));
    }
}
