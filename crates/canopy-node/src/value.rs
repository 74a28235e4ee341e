//! Value variants
//!
//! A node holds exactly one [`NodeValue`]. Variants are swapped whole when a
//! node changes shape; list and map variants guard their own child
//! containers so concurrent indexers observe reindexing atomically.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;

use crate::arena::{Arena, NodeCell, NodeId};
use crate::error::{NodeError, Result};
use crate::key::Key;
use crate::tree::TreeShared;

/// Content shape of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No content
    Null,
    /// A single plain value
    Scalar,
    /// Ordered children keyed by index
    List,
    /// Children keyed by name
    Map,
}

impl ValueKind {
    /// Lowercase name for diagnostics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Scalar => "scalar",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        }
    }
}

/// Tagged node content
#[derive(Debug)]
pub(crate) enum NodeValue {
    Null,
    Scalar(ScalarValue),
    List(ListValue),
    Map(MapValue),
}

// The null variant carries no owner data, so every node shares one instance.
static NULL_VALUE: Lazy<Arc<NodeValue>> = Lazy::new(|| Arc::new(NodeValue::Null));

pub(crate) fn null_value() -> Arc<NodeValue> {
    Arc::clone(&NULL_VALUE)
}

/// Outcome of inserting a child into a container variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Inserted {
    /// Slot was empty
    Added,
    /// Slot held this child, now displaced
    Replaced(NodeId),
    /// `only_if_absent` insert found this child already present
    Occupied(NodeId),
}

impl NodeValue {
    pub(crate) fn kind(&self) -> ValueKind {
        match self {
            NodeValue::Null => ValueKind::Null,
            NodeValue::Scalar(_) => ValueKind::Scalar,
            NodeValue::List(_) => ValueKind::List,
            NodeValue::Map(_) => ValueKind::Map,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            NodeValue::Null => true,
            NodeValue::Scalar(scalar) => scalar.is_empty(),
            NodeValue::List(list) => list.is_empty(),
            NodeValue::Map(map) => map.is_empty(),
        }
    }

    pub(crate) fn raw_scalar(&self) -> Option<JsonValue> {
        match self {
            NodeValue::Scalar(scalar) => Some(scalar.get()),
            _ => None,
        }
    }

    pub(crate) fn child(&self, key: &Key) -> Option<NodeId> {
        match self {
            NodeValue::Null | NodeValue::Scalar(_) => None,
            NodeValue::List(list) => list.child(key),
            NodeValue::Map(map) => map.child(key),
        }
    }

    /// Snapshot of `(key, child)` pairs in container order
    pub(crate) fn children(&self) -> Vec<(Key, NodeId)> {
        match self {
            NodeValue::Null | NodeValue::Scalar(_) => Vec::new(),
            NodeValue::List(list) => list.children(),
            NodeValue::Map(map) => map.children(),
        }
    }

    pub(crate) fn insert(
        &self,
        key: &Key,
        child: (NodeId, &NodeCell),
        only_if_absent: bool,
    ) -> Result<Inserted> {
        match self {
            NodeValue::Null | NodeValue::Scalar(_) => Err(NodeError::illegal_state(format!(
                "{} value cannot hold children",
                self.kind().as_str()
            ))),
            NodeValue::List(list) => list.insert(key, child, only_if_absent),
            NodeValue::Map(map) => map.insert(key, child, only_if_absent),
        }
    }

    pub(crate) fn remove(&self, arena: &Arena, key: &Key) -> Option<NodeId> {
        match self {
            NodeValue::Null | NodeValue::Scalar(_) => None,
            NodeValue::List(list) => list.remove(arena, key),
            NodeValue::Map(map) => map.remove(key),
        }
    }

    /// Replace the content in place, returning displaced children
    ///
    /// # Errors
    /// - `Unsupported` on the null variant, which must be promoted first
    /// - `InvalidArgument` when the payload does not fit the variant
    pub(crate) fn set(&self, tree: &TreeShared, owner: NodeId, value: JsonValue) -> Result<Vec<NodeId>> {
        match self {
            NodeValue::Null => Err(NodeError::Unsupported(
                "value should be changed from null type before setting value".into(),
            )),
            NodeValue::Scalar(scalar) => {
                scalar.set(value)?;
                Ok(Vec::new())
            }
            NodeValue::List(list) => Ok(list.set(tree, owner, value)),
            NodeValue::Map(map) => map.set(tree, owner, value),
        }
    }

    /// Drop every child, returning them for detachment
    pub(crate) fn take_children(&self) -> Vec<NodeId> {
        match self {
            NodeValue::Null | NodeValue::Scalar(_) => Vec::new(),
            NodeValue::List(list) => std::mem::take(&mut *list.children.lock()),
            NodeValue::Map(map) => std::mem::take(&mut *map.children.write())
                .into_values()
                .collect(),
        }
    }
}

/// Single plain value
#[derive(Debug)]
pub(crate) struct ScalarValue {
    value: RwLock<JsonValue>,
}

impl ScalarValue {
    pub(crate) fn new(value: JsonValue) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub(crate) fn get(&self) -> JsonValue {
        self.value.read().clone()
    }

    fn set(&self, value: JsonValue) -> Result<()> {
        if value.is_array() || value.is_object() {
            return Err(NodeError::InvalidArgument(
                "scalar values cannot hold sequences or mappings".into(),
            ));
        }
        *self.value.write() = value;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        match &*self.value.read() {
            JsonValue::Null => true,
            JsonValue::String(text) => text.is_empty(),
            JsonValue::Array(items) => items.is_empty(),
            JsonValue::Object(entries) => entries.is_empty(),
            JsonValue::Bool(_) | JsonValue::Number(_) => false,
        }
    }
}

/// Ordered children; a child's stamped key always equals its position
#[derive(Debug, Default)]
pub(crate) struct ListValue {
    children: Mutex<Vec<NodeId>>,
}

impl ListValue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_children(children: Vec<NodeId>) -> Self {
        Self {
            children: Mutex::new(children),
        }
    }

    fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    fn child(&self, key: &Key) -> Option<NodeId> {
        let index = key.as_index()?;
        self.children.lock().get(index).copied()
    }

    fn children(&self) -> Vec<(Key, NodeId)> {
        self.children
            .lock()
            .iter()
            .enumerate()
            .map(|(index, id)| (Key::Index(index), *id))
            .collect()
    }

    fn insert(&self, key: &Key, (id, cell): (NodeId, &NodeCell), only_if_absent: bool) -> Result<Inserted> {
        let mut children = self.children.lock();
        match key {
            Key::Unallocated => {
                cell.set_key(Key::Index(children.len()));
                children.push(id);
                Ok(Inserted::Added)
            }
            Key::Index(index) => {
                let index = *index;
                let len = children.len();
                if index < len {
                    if only_if_absent {
                        Ok(Inserted::Occupied(children[index]))
                    } else {
                        Ok(Inserted::Replaced(std::mem::replace(&mut children[index], id)))
                    }
                } else if index == len {
                    children.push(id);
                    Ok(Inserted::Added)
                } else {
                    Err(NodeError::IndexOutOfBounds { index, len })
                }
            }
            Key::Name(name) => Err(NodeError::InvalidArgument(format!(
                "list values are keyed by index, got name '{name}'"
            ))),
        }
    }

    fn remove(&self, arena: &Arena, key: &Key) -> Option<NodeId> {
        let index = key.as_index()?;
        let mut children = self.children.lock();
        if index >= children.len() {
            return None;
        }
        let removed = children.remove(index);
        // restamp while still holding the list lock
        for (position, id) in children.iter().enumerate().skip(index) {
            if let Some(cell) = arena.get(*id) {
                cell.set_key(Key::Index(position));
            }
        }
        Some(removed)
    }

    fn set(&self, tree: &TreeShared, owner: NodeId, value: JsonValue) -> Vec<NodeId> {
        let items = match value {
            JsonValue::Array(items) => items,
            single => vec![single],
        };
        let fresh = tree.build_items(owner, items);
        std::mem::replace(&mut *self.children.lock(), fresh)
    }
}

/// Named children in insertion order
///
/// Entries are always keyed by name; an index key addresses the entry named
/// by its decimal form.
#[derive(Debug, Default)]
pub(crate) struct MapValue {
    children: RwLock<IndexMap<Key, NodeId>>,
}

impl MapValue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_children(children: IndexMap<Key, NodeId>) -> Self {
        Self {
            children: RwLock::new(children),
        }
    }

    fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    fn child(&self, key: &Key) -> Option<NodeId> {
        let key = key.to_entry_key()?;
        self.children.read().get(&key).copied()
    }

    fn children(&self) -> Vec<(Key, NodeId)> {
        self.children
            .read()
            .iter()
            .map(|(key, id)| (key.clone(), *id))
            .collect()
    }

    fn insert(&self, key: &Key, (id, cell): (NodeId, &NodeCell), only_if_absent: bool) -> Result<Inserted> {
        let Some(key) = key.to_entry_key() else {
            return Err(NodeError::InvalidArgument(
                "map values cannot hold unallocated keys".into(),
            ));
        };
        let mut children = self.children.write();
        cell.set_key(key.clone());
        match children.entry(key) {
            indexmap::map::Entry::Occupied(mut entry) => {
                if only_if_absent {
                    Ok(Inserted::Occupied(*entry.get()))
                } else {
                    Ok(Inserted::Replaced(std::mem::replace(entry.get_mut(), id)))
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(Inserted::Added)
            }
        }
    }

    fn remove(&self, key: &Key) -> Option<NodeId> {
        let key = key.to_entry_key()?;
        self.children.write().shift_remove(&key)
    }

    fn set(&self, tree: &TreeShared, owner: NodeId, value: JsonValue) -> Result<Vec<NodeId>> {
        let JsonValue::Object(entries) = value else {
            return Err(NodeError::InvalidArgument(
                "map values can only be set from a mapping".into(),
            ));
        };
        let fresh = tree.build_entries(owner, entries);
        let old = std::mem::replace(&mut *self.children.write(), fresh);
        Ok(old.into_values().collect())
    }
}
