//! Trees and their configuration

use std::fmt;
use std::sync::Arc;

use canopy_convert::{Converter, LenientConverter, StrictConverter};
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::arena::{Arena, NodeCell, NodeId};
use crate::key::Key;
use crate::node::Node;
use crate::shape::Shape;
use crate::value::{null_value, ListValue, MapValue, NodeValue, ScalarValue};

/// Tree-wide settings
///
/// # Example
/// ```
/// use canopy_node::{Tree, TreeConfig};
///
/// let tree = Tree::with_config(TreeConfig::strict());
/// assert_eq!(tree.config().converter().name(), "strict");
/// ```
#[derive(Clone)]
pub struct TreeConfig {
    converter: Arc<dyn Converter>,
}

impl TreeConfig {
    /// Default configuration (lenient conversion)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration using [`StrictConverter`]
    #[must_use]
    pub fn strict() -> Self {
        Self::new().with_converter(StrictConverter)
    }

    /// Replace the conversion strategy
    #[must_use]
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    /// Active conversion strategy
    #[must_use]
    pub fn converter(&self) -> &dyn Converter {
        self.converter.as_ref()
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            converter: Arc::new(LenientConverter),
        }
    }
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("converter", &self.converter.name())
            .finish()
    }
}

/// Owner of a node hierarchy
///
/// Cloning a `Tree` shares the same nodes.
#[derive(Clone)]
pub struct Tree {
    shared: Arc<TreeShared>,
}

impl Tree {
    /// Empty tree with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Empty tree with the given configuration
    #[must_use]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            shared: TreeShared::new(config, None),
        }
    }

    /// Tree whose root holds `value`; null entries are skipped
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        let tree = Self::new();
        tree.shared.install_root(|shared, root| shared.variant_from_json(root, value));
        tree
    }

    /// Tree whose root carries `key` and holds a copy of `shape`
    pub(crate) fn from_shape(config: TreeConfig, key: Option<Key>, shape: &Shape) -> Self {
        let tree = Self {
            shared: TreeShared::new(config, key),
        };
        tree.shared.install_root(|shared, root| shared.variant_from_shape(root, shape));
        tree
    }

    /// Handle to the root node
    #[must_use]
    pub fn root(&self) -> Node {
        Node::root(Arc::clone(&self.shared))
    }

    /// Tree configuration
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.shared.config
    }

    /// Number of live node slots, root included
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.shared.arena.len()
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &TreeShared {
        &self.shared
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("config", &self.shared.config)
            .field("live_nodes", &self.live_nodes())
            .finish()
    }
}

/// State shared by every handle into one tree
#[derive(Debug)]
pub(crate) struct TreeShared {
    arena: Arena,
    config: TreeConfig,
    root: NodeId,
}

impl TreeShared {
    fn new(config: TreeConfig, root_key: Option<Key>) -> Arc<Self> {
        let arena = Arena::new();
        let (root, _) = arena.insert(NodeCell::new(root_key, None));
        Arc::new(Self { arena, config, root })
    }

    fn install_root(&self, build: impl FnOnce(&Self, NodeId) -> Arc<NodeValue>) {
        let Some(cell) = self.arena.get(self.root) else {
            return;
        };
        let value = build(self, self.root);
        let old = cell.swap_value(value);
        self.release(&old);
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    pub(crate) fn alloc(&self, parent: NodeId, key: Key) -> (NodeId, Arc<NodeCell>) {
        self.arena.insert(NodeCell::new(Some(key), Some(parent)))
    }

    /// Allocate a child holding `value`
    ///
    /// The child is unreachable until inserted into its parent, so it is
    /// filled without taking its guard.
    pub(crate) fn build_json(&self, parent: NodeId, key: Key, value: JsonValue) -> (NodeId, Arc<NodeCell>) {
        let (id, cell) = self.alloc(parent, key);
        cell.swap_value(self.variant_from_json(id, value));
        (id, cell)
    }

    pub(crate) fn variant_from_json(&self, owner: NodeId, value: JsonValue) -> Arc<NodeValue> {
        match value {
            JsonValue::Null => null_value(),
            JsonValue::Array(items) => {
                Arc::new(NodeValue::List(ListValue::from_children(self.build_items(owner, items))))
            }
            JsonValue::Object(entries) => {
                Arc::new(NodeValue::Map(MapValue::from_children(self.build_entries(owner, entries))))
            }
            scalar => Arc::new(NodeValue::Scalar(ScalarValue::new(scalar))),
        }
    }

    pub(crate) fn build_items(&self, owner: NodeId, items: Vec<JsonValue>) -> Vec<NodeId> {
        items
            .into_iter()
            .filter(|item| !item.is_null())
            .enumerate()
            .map(|(index, item)| self.build_json(owner, Key::Index(index), item).0)
            .collect()
    }

    pub(crate) fn build_entries(&self, owner: NodeId, entries: JsonMap<String, JsonValue>) -> IndexMap<Key, NodeId> {
        entries
            .into_iter()
            .filter(|(_, item)| !item.is_null())
            .map(|(name, item)| {
                let key = Key::Name(name);
                let (id, _) = self.build_json(owner, key.clone(), item);
                (key, id)
            })
            .collect()
    }

    pub(crate) fn build_shape(&self, parent: NodeId, key: Key, shape: &Shape) -> (NodeId, Arc<NodeCell>) {
        let (id, cell) = self.alloc(parent, key);
        cell.swap_value(self.variant_from_shape(id, shape));
        (id, cell)
    }

    pub(crate) fn variant_from_shape(&self, owner: NodeId, shape: &Shape) -> Arc<NodeValue> {
        match shape {
            Shape::Null => null_value(),
            Shape::Scalar(value) => Arc::new(NodeValue::Scalar(ScalarValue::new(value.clone()))),
            Shape::List(items) => {
                let children = items
                    .iter()
                    .filter(|item| !matches!(item, Shape::Null))
                    .enumerate()
                    .map(|(index, item)| self.build_shape(owner, Key::Index(index), item).0)
                    .collect();
                Arc::new(NodeValue::List(ListValue::from_children(children)))
            }
            Shape::Map(entries) => {
                let children = entries
                    .iter()
                    .filter(|(_, item)| !matches!(item, Shape::Null))
                    .filter_map(|(key, item)| key.to_entry_key().map(|key| (key, item)))
                    .map(|(key, item)| (key.clone(), self.build_shape(owner, key, item).0))
                    .collect();
                Arc::new(NodeValue::Map(MapValue::from_children(children)))
            }
        }
    }

    /// Free a node and everything below it
    ///
    /// Callers hold the guard of the node's former parent (or own the
    /// variant that held it), so locking here stays parent-then-child.
    pub(crate) fn destroy(&self, id: NodeId) {
        let Some(cell) = self.arena.remove(id) else {
            return;
        };
        let old = {
            let _guard = cell.lock();
            cell.mark_detached();
            cell.swap_value(null_value())
        };
        tracing::trace!(node = %id, "detached node");
        self.release(&old);
    }

    /// Remove `child` from `parent` if it still sits at `key`, then free it
    ///
    /// The caller holds `parent`'s guard.
    pub(crate) fn unlink(&self, parent: &NodeCell, key: &Key, child: NodeId) -> bool {
        let value = parent.value();
        if value.child(key) != Some(child) {
            return false;
        }
        value.remove(&self.arena, key);
        self.destroy(child);
        true
    }

    /// Destroy every child held by a variant that was just replaced
    pub(crate) fn release(&self, value: &NodeValue) {
        for child in value.take_children() {
            self.destroy(child);
        }
    }

    /// Lock-free structural snapshot of a subtree
    pub(crate) fn snapshot(&self, id: NodeId) -> Shape {
        let Some(cell) = self.arena.get(id) else {
            return Shape::Null;
        };
        let value = cell.value();
        match &*value {
            NodeValue::Null => Shape::Null,
            NodeValue::Scalar(scalar) => Shape::Scalar(scalar.get()),
            NodeValue::List(_) => Shape::List(
                value
                    .children()
                    .into_iter()
                    .map(|(_, child)| self.snapshot(child))
                    .collect(),
            ),
            NodeValue::Map(_) => Shape::Map(
                value
                    .children()
                    .into_iter()
                    .map(|(key, child)| (key, self.snapshot(child)))
                    .collect(),
            ),
        }
    }
}
