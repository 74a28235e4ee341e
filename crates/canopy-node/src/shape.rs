//! Detached structural snapshots
//!
//! A [`Shape`] is an owned, lock-free copy of a subtree. Copy and merge take
//! a snapshot of their source first, so no operation ever holds a lock on
//! one node while reading another node's content upward in the tree.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::key::Key;
use crate::value::ValueKind;

/// Owned snapshot of a node's content
///
/// Equality compares maps without regard to entry order; the hash agrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// No content
    Null,
    /// Plain scalar payload
    Scalar(JsonValue),
    /// Elements in index order
    List(Vec<Shape>),
    /// Entries in insertion order
    Map(IndexMap<Key, Shape>),
}

impl Shape {
    /// Variant of the snapshot
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Shape::Null => ValueKind::Null,
            Shape::Scalar(_) => ValueKind::Scalar,
            Shape::List(_) => ValueKind::List,
            Shape::Map(_) => ValueKind::Map,
        }
    }

    /// Whether the snapshot holds nothing worth keeping
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Null => true,
            Shape::Scalar(value) => match value {
                JsonValue::Null => true,
                JsonValue::String(text) => text.is_empty(),
                _ => false,
            },
            Shape::List(items) => items.is_empty(),
            Shape::Map(entries) => entries.is_empty(),
        }
    }

    /// Plain nested data; map keys render through [`Key`]'s `Display`
    #[must_use]
    pub fn into_json(self) -> JsonValue {
        match self {
            Shape::Null => JsonValue::Null,
            Shape::Scalar(value) => value,
            Shape::List(items) => JsonValue::Array(items.into_iter().map(Shape::into_json).collect()),
            Shape::Map(entries) => {
                let object: JsonMap<String, JsonValue> = entries
                    .into_iter()
                    .map(|(key, shape)| (key.to_map_key(), shape.into_json()))
                    .collect();
                JsonValue::Object(object)
            }
        }
    }
}

/// Null elements and entries are dropped, matching how trees store data
impl From<JsonValue> for Shape {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Shape::Null,
            JsonValue::Array(items) => Shape::List(
                items
                    .into_iter()
                    .filter(|item| !item.is_null())
                    .map(Shape::from)
                    .collect(),
            ),
            JsonValue::Object(entries) => Shape::Map(
                entries
                    .into_iter()
                    .filter(|(_, item)| !item.is_null())
                    .map(|(name, item)| (Key::Name(name), Shape::from(item)))
                    .collect(),
            ),
            scalar => Shape::Scalar(scalar),
        }
    }
}

impl Hash for Shape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Shape::Null => {}
            Shape::Scalar(value) => value.to_string().hash(state),
            Shape::List(items) => items.hash(state),
            Shape::Map(entries) => {
                // order-insensitive, like IndexMap equality
                let combined = entries.iter().fold(0u64, |acc, (key, shape)| {
                    let mut entry = DefaultHasher::new();
                    key.hash(&mut entry);
                    shape.hash(&mut entry);
                    acc.wrapping_add(entry.finish())
                });
                entries.len().hash(state);
                combined.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash_of(shape: &Shape) -> u64 {
        let mut hasher = DefaultHasher::new();
        shape.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn from_json_drops_nulls() {
        let shape = Shape::from(json!({"a": null, "b": [1, null, 2]}));
        assert_eq!(shape.into_json(), json!({"b": [1, 2]}));
    }

    #[test]
    fn map_equality_ignores_order() {
        let first = Shape::from(json!({"x": 1, "y": 2}));
        let second = Shape::from(json!({"y": 2, "x": 1}));
        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));
    }

    #[test]
    fn list_order_matters() {
        let first = Shape::from(json!([1, 2]));
        let second = Shape::from(json!([2, 1]));
        assert_ne!(first, second);
    }

    #[test]
    fn index_keys_render_as_digits() {
        let mut entries = IndexMap::new();
        entries.insert(Key::Index(3), Shape::Scalar(json!("three")));
        assert_eq!(Shape::Map(entries).into_json(), json!({"3": "three"}));
    }

    #[test]
    fn emptiness() {
        assert!(Shape::Null.is_empty());
        assert!(Shape::Scalar(json!("")).is_empty());
        assert!(!Shape::Scalar(json!(0)).is_empty());
        assert!(Shape::List(Vec::new()).is_empty());
        assert_eq!(Shape::from(json!({})).kind(), ValueKind::Map);
    }
}
