//! NodeArena: generational storage for list nodes with per-node reference counts.
//!
//! A node stays allocated while anything can still reach it: the table's
//! `head` or `tail`, the `next` link of another node, or an iterator cursor.
//! Each of those holds exactly one count. When the count drops to zero the
//! node is freed and its own `next` link is released in turn, so a run of
//! tombstones unreachable from any cursor is reclaimed in one pass.

use crate::key::CanonicalKey;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable, generation-checked handle to a node.
    pub(crate) struct NodeId;
}

#[derive(Debug)]
pub(crate) enum NodeState<V> {
    Live { key: CanonicalKey, value: V },
    /// Deleted entry, cleared sentinel, or iterator start dummy.
    Tombstone,
}

#[derive(Debug)]
pub(crate) struct Node<V> {
    pub(crate) state: NodeState<V>,
    pub(crate) hash: u64,
    pub(crate) next: Option<NodeId>,
    /// Only meaningful on live nodes; always `None` on tombstones.
    pub(crate) prev: Option<NodeId>,
    refs: usize,
}

impl<V> Node<V> {
    #[inline]
    pub(crate) fn is_deleted(&self) -> bool {
        matches!(self.state, NodeState::Tombstone)
    }

    #[inline]
    pub(crate) fn key(&self) -> Option<&CanonicalKey> {
        match &self.state {
            NodeState::Live { key, .. } => Some(key),
            NodeState::Tombstone => None,
        }
    }

    #[inline]
    pub(crate) fn value(&self) -> Option<&V> {
        match &self.state {
            NodeState::Live { value, .. } => Some(value),
            NodeState::Tombstone => None,
        }
    }

    #[inline]
    pub(crate) fn value_mut(&mut self) -> Option<&mut V> {
        match &mut self.state {
            NodeState::Live { value, .. } => Some(value),
            NodeState::Tombstone => None,
        }
    }

    /// Turn the node into a tombstone and hand back what it held. The
    /// forward link is left in place; the backward link is dropped.
    pub(crate) fn tombstone(&mut self) -> Option<(CanonicalKey, V)> {
        self.prev = None;
        match core::mem::replace(&mut self.state, NodeState::Tombstone) {
            NodeState::Live { key, value } => Some((key, value)),
            NodeState::Tombstone => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeArena<V> {
    slots: SlotMap<NodeId, Node<V>>,
}

impl<V> NodeArena<V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    /// Number of allocated nodes, live or not.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a live node. It starts with no counts; the caller links it.
    pub(crate) fn alloc_live(&mut self, key: CanonicalKey, value: V, hash: u64) -> NodeId {
        self.slots.insert(Node {
            state: NodeState::Live { key, value },
            hash,
            next: None,
            prev: None,
            refs: 0,
        })
    }

    /// Allocate a tombstoned sentinel whose forward link is `next`.
    pub(crate) fn alloc_sentinel(&mut self, next: Option<NodeId>) -> NodeId {
        if let Some(n) = next {
            self.retain(n);
        }
        self.slots.insert(Node {
            state: NodeState::Tombstone,
            hash: 0,
            next,
            prev: None,
            refs: 0,
        })
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<V>> {
        self.slots.get(id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<V>> {
        self.slots.get_mut(id)
    }

    #[inline]
    pub(crate) fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id).and_then(|n| n.next)
    }

    /// Take one count on `id`.
    #[inline]
    pub(crate) fn retain(&mut self, id: NodeId) {
        let Some(node) = self.slots.get_mut(id) else {
            debug_assert!(false, "retain on a freed node");
            return;
        };
        let n = node.refs.wrapping_add(1);
        if n == 0 {
            // Same policy as `Rc`: never continue after a count overflow.
            std::process::abort();
        }
        node.refs = n;
    }

    /// Return one count on `id`, freeing every node whose count reaches zero
    /// along the forward chain.
    pub(crate) fn release(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(id) = cur.take() {
            let Some(node) = self.slots.get_mut(id) else {
                debug_assert!(false, "release on a freed node");
                return;
            };
            assert!(node.refs > 0, "node refcount underflow");
            node.refs -= 1;
            if node.refs > 0 {
                return;
            }
            if let Some(node) = self.slots.remove(id) {
                debug_assert!(node.is_deleted(), "live node lost its last reference");
                cur = node.next;
            }
        }
    }

    /// Point `from.next` at `to`, moving the count from the old target.
    pub(crate) fn set_next(&mut self, from: NodeId, to: Option<NodeId>) {
        let Some(node) = self.slots.get_mut(from) else {
            debug_assert!(false, "set_next on a freed node");
            return;
        };
        let old = core::mem::replace(&mut node.next, to);
        if let Some(t) = to {
            self.retain(t);
        }
        if let Some(o) = old {
            self.release(o);
        }
    }

    /// Move an owned count held in `slot` to `to`.
    pub(crate) fn repoint(&mut self, slot: &mut NodeId, to: NodeId) {
        if *slot == to {
            return;
        }
        self.retain(to);
        let old = core::mem::replace(slot, to);
        self.release(old);
    }

    #[cfg(test)]
    pub(crate) fn refs(&self, id: NodeId) -> Option<usize> {
        self.slots.get(id).map(|n| n.refs)
    }
}
