//! Generational node arena
//!
//! Every node cell of a tree lives in one [`Arena`], addressed by a
//! [`NodeId`]. Freed slots bump their generation, so a stale id never
//! resolves to a cell that later reuses the slot.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::key::Key;
use crate::value::{null_value, NodeValue};

/// Stable handle to a slot in a tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index
    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Storage for one node
///
/// `guard` is the node's exclusive critical section: every multi-step
/// mutation of `value` (and every change to the children it holds) runs
/// while it is held. `value` itself only makes the variant swap atomic.
pub(crate) struct NodeCell {
    key: RwLock<Option<Key>>,
    parent: Option<NodeId>,
    attached: AtomicBool,
    value: RwLock<Arc<NodeValue>>,
    guard: Mutex<()>,
}

impl NodeCell {
    pub(crate) fn new(key: Option<Key>, parent: Option<NodeId>) -> Self {
        Self {
            key: RwLock::new(key),
            parent,
            attached: AtomicBool::new(true),
            value: RwLock::new(null_value()),
            guard: Mutex::new(()),
        }
    }

    pub(crate) fn key(&self) -> Option<Key> {
        self.key.read().clone()
    }

    pub(crate) fn set_key(&self, key: Key) {
        *self.key.write() = Some(key);
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_detached(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Snapshot of the current variant
    pub(crate) fn value(&self) -> Arc<NodeValue> {
        self.value.read().clone()
    }

    /// Install a variant, returning the one it replaced
    pub(crate) fn swap_value(&self, value: Arc<NodeValue>) -> Arc<NodeValue> {
        std::mem::replace(&mut *self.value.write(), value)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock()
    }
}

impl fmt::Debug for NodeCell {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCell")
            .field("key", &self.key())
            .field("parent", &self.parent)
            .field("attached", &self.is_attached())
            .field("kind", &self.value().kind())
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    cell: Option<Arc<NodeCell>>,
}

/// Concurrent generational slab of node cells
///
/// Slot lookups never hold a shard lock beyond the call, so arena access is
/// always the innermost lock taken.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    slots: DashMap<u32, Slot>,
    next: AtomicU32,
    free: Mutex<Vec<u32>>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store a cell in a free slot
    pub(crate) fn insert(&self, cell: NodeCell) -> (NodeId, Arc<NodeCell>) {
        let cell = Arc::new(cell);
        let reused = self.free.lock().pop();
        let index = reused.unwrap_or_else(|| self.next.fetch_add(1, Ordering::Relaxed));

        let mut slot = self.slots.entry(index).or_insert(Slot {
            generation: 0,
            cell: None,
        });
        slot.cell = Some(Arc::clone(&cell));
        let id = NodeId {
            index,
            generation: slot.generation,
        };
        drop(slot);

        tracing::trace!(node = %id, "allocated slot");
        (id, cell)
    }

    /// Resolve an id; `None` once the slot was freed
    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<NodeCell>> {
        let slot = self.slots.get(&id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.cell.clone()
    }

    /// Free a slot, returning its cell
    pub(crate) fn remove(&self, id: NodeId) -> Option<Arc<NodeCell>> {
        let mut slot = self.slots.get_mut(&id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let cell = slot.cell.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        drop(slot);

        self.free.lock().push(id.index);
        tracing::trace!(node = %id, "freed slot");
        Some(cell)
    }

    /// Number of occupied slots
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.cell.is_some()).count()
    }
}
