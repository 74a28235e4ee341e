//! Node handles and the attachment protocol
//!
//! A [`Node`] is a cheap handle into a tree. Handles returned by
//! [`TreeNode::node`] for paths that hold no content yet are *virtual*: they
//! remember their parent handle and key but occupy no arena slot. The first
//! write through a virtual handle attaches it, which first attaches every
//! virtual ancestor from the outermost inward, promoting parent variants as
//! needed.
//!
//! Lock discipline: a node's children only change while its guard is held;
//! guards are taken parent then child; readers take no guards.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use canopy_convert::Converter;

use crate::arena::{NodeCell, NodeId};
use crate::error::{NodeError, Result};
use crate::key::Key;
use crate::merge;
use crate::path::NodePath;
use crate::shape::Shape;
use crate::tree::{Tree, TreeConfig, TreeShared};
use crate::value::{Inserted, ListValue, MapValue, NodeValue, ValueKind};

/// Public operations of a tree node
pub trait TreeNode: Sized + Clone {
    /// Key within the parent; `None` for the root
    fn key(&self) -> Option<Key>;

    /// Parent handle; `None` for the root
    fn parent(&self) -> Option<Self>;

    /// Descendant at `path`, virtual where no content exists yet
    ///
    /// Never mutates the tree. Each call for a missing path yields a fresh
    /// virtual handle.
    fn node<I>(&self, path: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>;

    /// Whether every segment of `path` resolves to a real descendant
    fn has_child<I>(&self, path: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Key>;

    /// Virtual child whose index is assigned when it joins a list
    fn append_child(&self) -> Self;

    /// Detach and clear the child at `key`; returns whether one existed
    fn remove_child(&self, key: impl Into<Key>) -> bool;

    /// Whether this handle has no committed content in the tree
    fn is_virtual(&self) -> bool;

    /// Current variant; virtual nodes report [`ValueKind::Null`]
    fn kind(&self) -> ValueKind;

    /// Whether the node holds the null variant (or is virtual)
    fn is_null(&self) -> bool {
        self.kind() == ValueKind::Null
    }

    /// Whether the node holds a list
    fn is_list(&self) -> bool {
        self.kind() == ValueKind::List
    }

    /// Whether the node holds a map
    fn is_map(&self) -> bool {
        self.kind() == ValueKind::Map
    }

    /// Whether the node holds nothing: null, an empty scalar, or no children
    fn is_empty(&self) -> bool;

    /// Stored content as plain nested data
    fn get(&self) -> JsonValue;

    /// Stored content decoded as `T`; `None` when null
    ///
    /// # Errors
    /// [`NodeError::Conversion`] when the content cannot become a `T`
    fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>>;

    /// Like [`get_as`](Self::get_as), storing `default` when null
    ///
    /// # Errors
    /// Conversion failures, or errors from writing the default back
    fn get_as_or<T>(&self, default: T) -> Result<T>
    where
        T: DeserializeOwned + Serialize;

    /// Like [`get_as_or`](Self::get_as_or) with a lazily built default
    ///
    /// # Errors
    /// Conversion failures, or errors from writing the default back
    fn get_as_or_else<T, F>(&self, default: F) -> Result<T>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce() -> T;

    /// Store `value`, attaching this node if virtual
    ///
    /// Null detaches the node from its parent (or clears a root). Sequences
    /// and mappings replace the content wholesale. The whole value passes
    /// through the tree's converter first.
    ///
    /// # Errors
    /// Serialization or normalization failures, or structural errors
    fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<&Self>;

    /// [`set`](Self::set) without normalization
    ///
    /// # Errors
    /// Structural errors raised while attaching
    fn set_raw(&self, value: JsonValue) -> Result<&Self>;

    /// Replace this node's content with a deep copy of `other`
    ///
    /// # Errors
    /// Structural errors raised while attaching
    fn from(&self, other: &Self) -> Result<&Self>;

    /// Fill gaps in this node from `other`, keeping existing data
    ///
    /// # Errors
    /// Structural errors raised while attaching
    fn merge_from(&self, other: &Self) -> Result<&Self>;

    /// Scalar payload, if the node holds one
    fn raw_scalar(&self) -> Option<JsonValue>;

    /// Element handles of a list node; empty otherwise
    fn children_list(&self) -> Vec<Self>;

    /// Entry handles of a map node in insertion order; empty otherwise
    fn children_map(&self) -> IndexMap<Key, Self>;

    /// Root of a new tree holding a deep copy of this node
    ///
    /// The copy keeps this node's key, so it compares equal to the original.
    /// It has no parent; place it under one with `parent.node([key]).from(&copy)`.
    fn copy(&self) -> Self;

    /// Whether both handles denote the same node
    fn same_node(&self, other: &Self) -> bool;
}

/// Handle to a node of a [`Tree`]
#[derive(Clone)]
pub struct Node(Arc<Handle>);

struct Handle {
    tree: Arc<TreeShared>,
    parent: Option<Node>,
    binding: Mutex<Binding>,
}

struct Binding {
    key: Option<Key>,
    slot: Option<NodeId>,
}

impl Node {
    pub(crate) fn root(tree: Arc<TreeShared>) -> Self {
        let root = tree.root_id();
        Self::with_binding(tree, None, None, Some(root))
    }

    fn with_binding(tree: Arc<TreeShared>, parent: Option<Node>, key: Option<Key>, slot: Option<NodeId>) -> Self {
        Node(Arc::new(Handle {
            tree,
            parent,
            binding: Mutex::new(Binding { key, slot }),
        }))
    }

    fn tree(&self) -> &TreeShared {
        &self.0.tree
    }

    /// Configuration of the owning tree
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        self.tree().config()
    }

    fn converter(&self) -> &dyn Converter {
        self.config().converter()
    }

    /// Arena slot currently bound; `None` when virtual
    #[must_use]
    pub fn id(&self) -> Option<NodeId> {
        self.resolve().map(|(id, _)| id)
    }

    /// Keys from the root down to this node
    #[must_use]
    pub fn path(&self) -> NodePath {
        let mut keys = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(key) = node.key() {
                keys.push(key);
            }
            current = node.0.parent.clone();
        }
        keys.reverse();
        NodePath::from(keys)
    }

    /// Owned snapshot of the content
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self.resolve() {
            Some((id, _)) => self.tree().snapshot(id),
            None => Shape::Null,
        }
    }

    /// Live cell behind this handle, refreshing the cached key
    ///
    /// A binding whose slot was freed or detached is dropped, turning the
    /// handle virtual again.
    fn resolve(&self) -> Option<(NodeId, Arc<NodeCell>)> {
        let mut binding = self.0.binding.lock();
        let id = binding.slot?;
        match self.tree().arena().get(id) {
            Some(cell) if cell.is_attached() => {
                if let Some(key) = cell.key() {
                    binding.key = Some(key);
                }
                Some((id, cell))
            }
            _ => {
                binding.slot = None;
                None
            }
        }
    }

    fn bind(&self, id: NodeId, cell: &NodeCell) {
        let mut binding = self.0.binding.lock();
        binding.slot = Some(id);
        if let Some(key) = cell.key() {
            binding.key = Some(key);
        }
    }

    fn child_handle(&self, key: Key) -> Node {
        if let Some((_, cell)) = self.resolve() {
            if let Some(id) = cell.value().child(&key) {
                if let Some(child) = self.tree().arena().get(id) {
                    let key = child.key().unwrap_or(key);
                    return Self::with_binding(Arc::clone(&self.0.tree), Some(self.clone()), Some(key), Some(id));
                }
            }
        }
        Self::with_binding(Arc::clone(&self.0.tree), Some(self.clone()), Some(key), None)
    }

    /// Attach this node and every virtual ancestor
    ///
    /// The whole chain attaches while the nearest attached ancestor's guard
    /// is held, so a step failing part way down unwinds every step above it.
    fn ensure_attached(&self) -> Result<(NodeId, Arc<NodeCell>)> {
        loop {
            if let Some(found) = self.resolve() {
                return Ok(found);
            }

            let mut chain = vec![self.clone()];
            let mut anchor = None;
            let mut current = self.0.parent.clone();
            while let Some(node) = current {
                if let Some(found) = node.resolve() {
                    anchor = Some(found);
                    break;
                }
                current = node.0.parent.clone();
                chain.push(node);
            }
            let Some((anchor_id, anchor_cell)) = anchor else {
                return Err(NodeError::illegal_state("virtual node has no attached ancestor"));
            };

            let _guard = anchor_cell.lock();
            if !anchor_cell.is_attached() {
                tracing::warn!(parent = %anchor_id, "parent evicted while attaching, retrying");
                continue;
            }
            return attach_chain(anchor_id, &anchor_cell, &chain);
        }
    }

    /// Insert this node into `parent`, whose guard the caller holds
    ///
    /// A promotion installs the new parent variant right away; the variant it
    /// replaced stays in the returned `Step` until committed or restored.
    fn attach_locked(&self, parent_id: NodeId, parent: &NodeCell, only_if_absent: bool) -> Result<Step> {
        let tree = self.tree();
        // a concurrent writer may have attached this same handle
        if let Some((id, cell)) = self.resolve() {
            return Ok(Step::adopted(id, cell));
        }
        let Some(mut key) = self.0.binding.lock().key.clone() else {
            return Err(NodeError::InvalidArgument("cannot attach a node without a key".into()));
        };

        let current = parent.value();
        let promotion = promote(tree, parent_id, &current, &key);
        if promotion.as_ref().is_some_and(|p| p.appends) {
            key = Key::Unallocated;
        }
        let target = promotion.as_ref().map_or(&current, |p| &p.value);

        let (child_id, child_cell) = tree.alloc(parent_id, key.clone());
        let inserted = match target.insert(&key, (child_id, &*child_cell), only_if_absent) {
            Ok(inserted) => inserted,
            Err(e) => {
                tree.arena().remove(child_id);
                if let Some(promotion) = &promotion {
                    tree.release(&promotion.value);
                }
                return Err(e);
            }
        };

        let (id, cell, created) = match inserted {
            Inserted::Added => (child_id, child_cell, true),
            Inserted::Replaced(previous) => {
                tree.destroy(previous);
                (child_id, child_cell, true)
            }
            Inserted::Occupied(existing) => {
                tree.arena().remove(child_id);
                let Some(cell) = tree.arena().get(existing) else {
                    return Err(NodeError::illegal_state("container holds a freed child"));
                };
                (existing, cell, false)
            }
        };

        let previous = promotion.map(|promotion| {
            tracing::debug!(
                node = %parent_id,
                from = current.kind().as_str(),
                to = promotion.value.kind().as_str(),
                "promoted value"
            );
            parent.swap_value(promotion.value)
        });

        self.bind(id, &cell);
        tracing::trace!(node = %id, parent = %parent_id, key = ?cell.key(), "attached child");
        Ok(Step {
            id,
            cell,
            created,
            previous,
        })
    }

    /// Run `apply` inside this node's critical section, attaching it first
    fn commit<R>(&self, apply: impl FnOnce(&TreeShared, NodeId, &NodeCell) -> Result<R>) -> Result<R> {
        loop {
            let (id, cell) = self.ensure_attached()?;
            let _guard = cell.lock();
            if !cell.is_attached() {
                tracing::warn!(node = %id, "node detached before commit, retrying");
                continue;
            }
            return apply(self.tree(), id, &*cell);
        }
    }

    fn insert_new_value(&self, value: JsonValue) -> Result<()> {
        self.commit(|tree, id, cell| {
            let current = cell.value();
            let reuse = match (&*current, &value) {
                (NodeValue::List(_), JsonValue::Array(_)) | (NodeValue::Map(_), JsonValue::Object(_)) => true,
                (NodeValue::Scalar(_), plain) => !plain.is_array() && !plain.is_object(),
                _ => false,
            };
            if reuse {
                for displaced in current.set(tree, id, value)? {
                    tree.destroy(displaced);
                }
            } else {
                let fresh = tree.variant_from_json(id, value);
                tracing::debug!(node = %id, from = current.kind().as_str(), to = fresh.kind().as_str(), "replaced value");
                let old = cell.swap_value(fresh);
                tree.release(&old);
            }
            Ok(())
        })
    }

    fn install_shape(&self, shape: &Shape) -> Result<()> {
        if matches!(shape, Shape::Null) {
            self.detach();
            return Ok(());
        }
        self.commit(|tree, id, cell| {
            let old = cell.swap_value(tree.variant_from_shape(id, shape));
            tree.release(&old);
            Ok(())
        })
    }

    fn store(&self, value: JsonValue) -> Result<()> {
        if value.is_null() {
            self.detach();
            Ok(())
        } else {
            self.insert_new_value(value)
        }
    }

    /// Remove this node from its parent, or clear it when it is a root
    fn detach(&self) {
        let Some((id, cell)) = self.resolve() else {
            return;
        };
        let tree = self.tree();
        match cell.parent() {
            Some(parent_id) => {
                let Some(parent) = tree.arena().get(parent_id) else {
                    return;
                };
                let _guard = parent.lock();
                if let Some(key) = cell.key() {
                    tree.unlink(&parent, &key, id);
                }
            }
            None => self.clear(&cell),
        }
    }

    fn clear(&self, cell: &NodeCell) {
        let old = {
            let _guard = cell.lock();
            cell.swap_value(crate::value::null_value())
        };
        self.tree().release(&old);
    }
}

/// Attach `chain` (innermost first) below `parent`, whose guard the caller holds
fn attach_chain(parent_id: NodeId, parent: &NodeCell, chain: &[Node]) -> Result<(NodeId, Arc<NodeCell>)> {
    let Some((node, inner)) = chain.split_last() else {
        return Err(NodeError::illegal_state("empty attach chain"));
    };
    let tree = node.tree();
    // ancestors adopt whatever a concurrent writer attached first
    let step = node.attach_locked(parent_id, parent, !inner.is_empty())?;
    if inner.is_empty() {
        step.commit(tree);
        return Ok((step.id, step.cell));
    }

    let attached = {
        let _guard = step.cell.lock();
        attach_chain(step.id, &step.cell, inner)
    };
    match attached {
        Ok(found) => {
            step.commit(tree);
            Ok(found)
        }
        Err(e) => {
            step.undo(tree, parent);
            Err(e)
        }
    }
}

/// One attach performed under its parent's guard
struct Step {
    id: NodeId,
    cell: Arc<NodeCell>,
    created: bool,
    // parent variant displaced by a promotion
    previous: Option<Arc<NodeValue>>,
}

impl Step {
    fn adopted(id: NodeId, cell: Arc<NodeCell>) -> Self {
        Self {
            id,
            cell,
            created: false,
            previous: None,
        }
    }

    fn commit(&self, tree: &TreeShared) {
        if let Some(previous) = &self.previous {
            tree.release(previous);
        }
    }

    /// Take the child back out and restore the parent's former variant
    fn undo(self, tree: &TreeShared, parent: &NodeCell) {
        if self.created {
            if let Some(key) = self.cell.key() {
                tree.unlink(parent, &key, self.id);
            }
        }
        if let Some(previous) = self.previous {
            let promoted = parent.swap_value(previous);
            tree.release(&promoted);
        }
        tracing::trace!(node = %self.id, "rolled back attach");
    }
}

struct Promotion {
    value: Arc<NodeValue>,
    // the incoming child is appended after a demoted scalar
    appends: bool,
}

fn promote(tree: &TreeShared, owner: NodeId, current: &NodeValue, key: &Key) -> Option<Promotion> {
    let list_key = key.is_list_key();
    let (value, appends) = match current {
        NodeValue::Null if list_key => (NodeValue::List(ListValue::new()), false),
        NodeValue::Null => (NodeValue::Map(MapValue::new()), false),
        NodeValue::Scalar(scalar) if list_key => {
            let (seed, _) = tree.build_json(owner, Key::Index(0), scalar.get());
            (NodeValue::List(ListValue::from_children(vec![seed])), true)
        }
        NodeValue::Scalar(_) => (NodeValue::Map(MapValue::new()), false),
        NodeValue::List(_) if !list_key => (NodeValue::Map(MapValue::new()), false),
        NodeValue::Map(_) if matches!(key, Key::Unallocated) => (NodeValue::List(ListValue::new()), false),
        NodeValue::List(_) | NodeValue::Map(_) => return None,
    };
    Some(Promotion {
        value: Arc::new(value),
        appends,
    })
}

impl TreeNode for Node {
    fn key(&self) -> Option<Key> {
        self.resolve();
        self.0.binding.lock().key.clone()
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.clone()
    }

    fn node<I>(&self, path: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        path.into_iter()
            .fold(self.clone(), |node, key| node.child_handle(key.into()))
    }

    fn has_child<I>(&self, path: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let Some((_, mut cell)) = self.resolve() else {
            return false;
        };
        for key in path {
            let Some(id) = cell.value().child(&key.into()) else {
                return false;
            };
            match self.tree().arena().get(id) {
                Some(child) => cell = child,
                None => return false,
            }
        }
        true
    }

    fn append_child(&self) -> Self {
        Self::with_binding(Arc::clone(&self.0.tree), Some(self.clone()), Some(Key::Unallocated), None)
    }

    fn remove_child(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let Some((_, cell)) = self.resolve() else {
            return false;
        };
        let tree = self.tree();
        let _guard = cell.lock();
        match cell.value().remove(tree.arena(), &key) {
            Some(removed) => {
                tree.destroy(removed);
                true
            }
            None => false,
        }
    }

    fn is_virtual(&self) -> bool {
        self.resolve().is_none()
    }

    fn kind(&self) -> ValueKind {
        self.resolve()
            .map_or(ValueKind::Null, |(_, cell)| cell.value().kind())
    }

    fn is_empty(&self) -> bool {
        self.resolve()
            .map_or(true, |(_, cell)| cell.value().is_empty())
    }

    fn get(&self) -> JsonValue {
        self.shape().into_json()
    }

    fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let value = self.get();
        if value.is_null() {
            return Ok(None);
        }
        canopy_convert::convert(self.converter(), value)
            .map(Some)
            .map_err(|e| {
                tracing::debug!(path = %self.path(), error = %e, "conversion failed");
                NodeError::from(e)
            })
    }

    fn get_as_or<T>(&self, default: T) -> Result<T>
    where
        T: DeserializeOwned + Serialize,
    {
        self.get_as_or_else(|| default)
    }

    fn get_as_or_else<T, F>(&self, default: F) -> Result<T>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get_as()? {
            return Ok(value);
        }
        let value = default();
        self.set(&value)?;
        Ok(value)
    }

    fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<&Self> {
        let stored = canopy_convert::to_storable(self.converter(), value).map_err(|e| {
            tracing::debug!(path = %self.path(), error = %e, "normalization failed");
            NodeError::from(e)
        })?;
        self.store(stored)?;
        Ok(self)
    }

    fn set_raw(&self, value: JsonValue) -> Result<&Self> {
        self.store(value)?;
        Ok(self)
    }

    fn from(&self, other: &Self) -> Result<&Self> {
        if self.same_node(other) {
            return Ok(self);
        }
        self.install_shape(&other.shape())?;
        Ok(self)
    }

    fn merge_from(&self, other: &Self) -> Result<&Self> {
        if other.is_virtual() {
            return Ok(self);
        }
        if self.is_virtual() || self.is_empty() {
            return self.from(other);
        }
        let incoming = other.shape();
        self.commit(|tree, id, cell| merge::merge_into(tree, id, cell, &incoming))?;
        Ok(self)
    }

    fn raw_scalar(&self) -> Option<JsonValue> {
        self.resolve().and_then(|(_, cell)| cell.value().raw_scalar())
    }

    fn children_list(&self) -> Vec<Self> {
        let Some((_, cell)) = self.resolve() else {
            return Vec::new();
        };
        let value = cell.value();
        if value.kind() != ValueKind::List {
            return Vec::new();
        }
        value
            .children()
            .into_iter()
            .map(|(key, id)| {
                Self::with_binding(Arc::clone(&self.0.tree), Some(self.clone()), Some(key), Some(id))
            })
            .collect()
    }

    fn children_map(&self) -> IndexMap<Key, Self> {
        let Some((_, cell)) = self.resolve() else {
            return IndexMap::new();
        };
        let value = cell.value();
        if value.kind() != ValueKind::Map {
            return IndexMap::new();
        }
        value
            .children()
            .into_iter()
            .map(|(key, id)| {
                let child = Self::with_binding(
                    Arc::clone(&self.0.tree),
                    Some(self.clone()),
                    Some(key.clone()),
                    Some(id),
                );
                (key, child)
            })
            .collect()
    }

    fn copy(&self) -> Self {
        Tree::from_shape(self.config().clone(), self.key(), &self.shape()).root()
    }

    fn same_node(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if !Arc::ptr_eq(&self.0.tree, &other.0.tree) {
            return false;
        }
        matches!((self.id(), other.id()), (Some(a), Some(b)) if a == b)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.shape() == other.shape()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
        self.shape().hash(state);
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.path().to_string())
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_convert::ConversionError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn lookup_of_missing_path_is_virtual() {
        let tree = Tree::new();
        let leaf = tree.root().node(["a", "b"]);
        assert!(leaf.is_virtual());
        assert!(leaf.is_empty());
        assert!(leaf.id().is_none());
        assert_eq!(leaf.path().to_string(), "a.b");
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn virtual_lookups_are_not_shared() {
        let root = Tree::new().root();
        let first = root.node(["x"]);
        let second = root.node(["x"]);
        assert!(!first.same_node(&second));
    }

    #[test]
    fn set_attaches_virtual_chain() {
        let tree = Tree::new();
        let root = tree.root();
        let leaf = root.node(["a", "b", "c"]);
        leaf.set(&5).unwrap();

        assert!(!leaf.is_virtual());
        assert!(root.has_child(["a"]));
        assert!(root.has_child(["a", "b"]));
        assert!(root.has_child(["a", "b", "c"]));
        assert_eq!(root.get(), json!({"a": {"b": {"c": 5}}}));
        assert_eq!(tree.live_nodes(), 4);
    }

    #[test]
    fn set_null_detaches() {
        let root = Tree::from_json(json!({"a": 1, "b": 2})).root();
        let a = root.node(["a"]);
        a.set(&JsonValue::Null).unwrap();
        assert!(a.is_virtual());
        assert_eq!(root.get(), json!({"b": 2}));
    }

    #[test]
    fn set_null_on_root_clears() {
        let tree = Tree::from_json(json!({"a": [1, 2]}));
        tree.root().set(&()).unwrap();
        assert!(tree.root().is_null());
        assert!(!tree.root().is_virtual());
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn set_replaces_across_variants() {
        let tree = Tree::new();
        let node = tree.root().node(["v"]);
        node.set(&json!([1, 2, 3])).unwrap();
        assert!(node.is_list());
        node.set(&json!({"k": "v"})).unwrap();
        assert!(node.is_map());
        node.set("text").unwrap();
        assert_eq!(node.raw_scalar(), Some(json!("text")));
        // root + v
        assert_eq!(tree.live_nodes(), 2);
    }

    #[test]
    fn list_over_list_reuses_variant() {
        let tree = Tree::new();
        let node = tree.root().node(["v"]);
        node.set(&[1, 2, 3]).unwrap();
        node.set(&[4]).unwrap();
        assert_eq!(node.get(), json!([4]));
        assert_eq!(tree.live_nodes(), 3);
    }

    #[test]
    fn out_of_range_index_leaves_tree_untouched() {
        let root = Tree::from_json(json!({"list": [1]})).root();
        let err = root.node(["list"]).node([5usize]).set(&2).unwrap_err();
        assert!(matches!(err, NodeError::IndexOutOfBounds { index: 5, len: 1 }));
        assert_eq!(root.get(), json!({"list": [1]}));
    }

    #[test]
    fn failed_attach_unwinds_virtual_ancestors() {
        let tree = Tree::from_json(json!({}));
        let root = tree.root();
        let err = root.node(["a"]).node([5usize]).set(&1).unwrap_err();
        assert!(matches!(err, NodeError::IndexOutOfBounds { index: 5, len: 0 }));
        assert_eq!(root.get(), json!({}));
        assert!(!root.has_child(["a"]));
        assert_eq!(tree.live_nodes(), 1);

        let deep: [Key; 3] = ["a".into(), 3usize.into(), "x".into()];
        assert!(root.node(deep).set(&1).is_err());
        assert_eq!(root.get(), json!({}));
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn failed_attach_restores_promoted_parents() {
        let tree = Tree::from_json(json!({"v": "s", "l": [1, 2]}));
        let root = tree.root();
        let live = tree.live_nodes();

        let below_scalar: [Key; 3] = ["v".into(), "k".into(), 2usize.into()];
        assert!(root.node(below_scalar).set(&1).is_err());
        let below_list: [Key; 3] = ["l".into(), "k".into(), 4usize.into()];
        assert!(root.node(below_list).set(&1).is_err());

        assert_eq!(root.get(), json!({"v": "s", "l": [1, 2]}));
        assert_eq!(root.node(["v"]).raw_scalar(), Some(json!("s")));
        assert!(root.node(["l"]).is_list());
        assert_eq!(tree.live_nodes(), live);

        // the tree stays writable afterwards
        root.node(["l"]).node([2usize]).set(&3).unwrap();
        assert_eq!(root.get(), json!({"v": "s", "l": [1, 2, 3]}));
    }

    #[test]
    fn keyless_attach_is_an_invalid_argument() {
        let tree = Tree::new();
        let root = tree.root();
        let keyless = Node::with_binding(Arc::clone(&root.0.tree), Some(root.clone()), None, None);
        assert!(matches!(keyless.set(&1), Err(NodeError::InvalidArgument(_))));
        assert_eq!(tree.live_nodes(), 1);
    }

    #[test]
    fn index_keys_address_named_map_entries() {
        let root = Tree::from_json(json!({"m": {"7": "name"}})).root();
        let m = root.node(["m"]);
        let seven = m.node([7usize]);
        assert!(!seven.is_virtual());
        assert_eq!(seven.get(), json!("name"));

        seven.set("index").unwrap();
        assert_eq!(m.children_map().len(), 1);
        assert_eq!(root.get(), json!({"m": {"7": "index"}}));
        assert_eq!(Tree::from_json(root.get()).root(), root);
        assert!(m.remove_child(7usize));
        assert!(m.is_empty());
    }

    #[derive(Debug)]
    struct NoText;

    fn holds_text(value: &JsonValue) -> bool {
        match value {
            JsonValue::String(_) => true,
            JsonValue::Array(items) => items.iter().any(holds_text),
            JsonValue::Object(entries) => entries.values().any(holds_text),
            _ => false,
        }
    }

    impl Converter for NoText {
        fn name(&self) -> &'static str {
            "no-text"
        }

        fn normalize(&self, value: JsonValue) -> std::result::Result<JsonValue, ConversionError> {
            if holds_text(&value) {
                return Err(ConversionError::Unstorable("text is not accepted".into()));
            }
            Ok(value)
        }

        fn alternatives(&self, _value: &JsonValue) -> Vec<JsonValue> {
            Vec::new()
        }
    }

    #[test]
    fn set_normalizes_containers_too() {
        let tree = Tree::with_config(TreeConfig::new().with_converter(NoText));
        let node = tree.root().node(["v"]);
        assert!(matches!(node.set("x"), Err(NodeError::Conversion(_))));
        assert!(matches!(node.set(&["x"]), Err(NodeError::Conversion(_))));
        assert!(matches!(node.set(&json!({"k": "x"})), Err(NodeError::Conversion(_))));
        assert!(node.is_virtual());

        node.set(&[1, 2]).unwrap();
        assert_eq!(node.get(), json!([1, 2]));
        // set_raw skips the converter
        node.set_raw(json!("x")).unwrap();
        assert_eq!(node.get(), json!("x"));
    }

    #[test]
    fn promotion_from_null_picks_by_key() {
        let root = Tree::new().root();
        root.node(["m", "name"]).set(&1).unwrap();
        root.node(["l"]).node([0usize]).set(&1).unwrap();
        assert!(root.node(["m"]).is_map());
        assert!(root.node(["l"]).is_list());
    }

    #[test]
    fn map_with_index_key_stays_map() {
        let root = Tree::from_json(json!({"m": {"a": 1}})).root();
        root.node(["m"]).node([7usize]).set(&2).unwrap();
        assert_eq!(root.get(), json!({"m": {"a": 1, "7": 2}}));
    }

    #[test]
    fn get_as_converts_through_strategy() {
        let root = Tree::from_json(json!({"port": "8080", "flag": "true"})).root();
        assert_eq!(root.node(["port"]).get_as::<u16>().unwrap(), Some(8080));
        assert_eq!(root.node(["flag"]).get_as::<bool>().unwrap(), Some(true));
        assert_eq!(root.node(["missing"]).get_as::<u16>().unwrap(), None);
        assert!(root.node(["flag"]).get_as::<Vec<u8>>().is_err());
    }

    #[test]
    fn strict_tree_rejects_coercion() {
        let tree = Tree::with_config(TreeConfig::strict());
        let node = tree.root().node(["port"]);
        node.set("8080").unwrap();
        let err = node.get_as::<u16>().unwrap_err();
        assert!(matches!(err, NodeError::Conversion(_)));
    }

    #[test]
    fn get_as_or_writes_default_back() {
        let root = Tree::new().root();
        let timeout = root.node(["timeout"]);
        assert_eq!(timeout.get_as_or(30u32).unwrap(), 30);
        assert!(!timeout.is_virtual());
        assert_eq!(root.get(), json!({"timeout": 30}));
        assert_eq!(timeout.get_as_or_else(|| 99u32).unwrap(), 30);
    }

    #[test]
    fn from_self_is_noop() {
        let root = Tree::from_json(json!({"a": [1, {"b": 2}]})).root();
        let before = root.get();
        let alias = root.node(Vec::<Key>::new());
        root.from(&alias).unwrap();
        assert_eq!(root.get(), before);
    }

    #[test]
    fn children_snapshots() {
        let root = Tree::from_json(json!({"list": ["a", "b"], "map": {"z": 1, "y": 2}})).root();
        let values: Vec<_> = root.node(["list"]).children_list().iter().map(TreeNode::get).collect();
        assert_eq!(values, [json!("a"), json!("b")]);
        let keys: Vec<_> = root.node(["map"]).children_map().into_keys().collect();
        assert_eq!(keys, [Key::from("z"), Key::from("y")]);
        assert!(root.node(["list"]).children_map().is_empty());
        assert!(root.node(["map"]).children_list().is_empty());
    }

    #[test]
    fn structural_equality_ignores_identity() {
        let first = Tree::from_json(json!({"a": {"x": 1}})).root();
        let second = Tree::from_json(json!({"a": {"x": 1}})).root();
        assert_eq!(first.node(["a"]), second.node(["a"]));
        assert_ne!(first.node(["a"]), second.node(["a", "x"]));
    }

    #[test]
    fn serializes_as_plain_data() {
        let root = Tree::from_json(json!({"a": [true, 1.5]})).root();
        assert_eq!(serde_json::to_value(&root).unwrap(), json!({"a": [true, 1.5]}));
    }

    #[test]
    fn debug_names_path_and_kind() {
        let root = Tree::from_json(json!({"a": {"b": 1}})).root();
        let debug = format!("{:?}", root.node(["a", "b"]));
        assert!(debug.contains("a.b"));
        assert!(debug.contains("Scalar"));
    }
}
