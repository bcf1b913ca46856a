//! OrderedTable: keyed index plus an insertion-ordered, tombstoned node list.
//!
//! The index maps canonical keys to live nodes. The list threads every node
//! from `head` through `next` links in insertion order. Deleted nodes are
//! spliced out of the live chain but keep their `next` link, so a cursor
//! parked on or before them can still walk forward to later live nodes.

use crate::key::{CanonicalKey, Key};
use crate::node_arena::{Node, NodeArena, NodeId, NodeState};
use core::hash::BuildHasher;
use hashbrown::HashTable;
use std::collections::hash_map::RandomState;
use tracing::trace;

/// A forward-only position in the node list. Owns one count on the node it
/// sits on; return it with [`OrderedTable::close_cursor`].
#[derive(Debug)]
pub struct Cursor {
    at: NodeId,
}

pub struct OrderedTable<V, S = RandomState> {
    hasher: S,
    index: HashTable<NodeId>,
    nodes: NodeArena<V>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    /// Tombstones whose forward link ran out before anything followed them.
    /// Uncounted: a slot freed in the meantime simply fails to resolve.
    dangling: Vec<NodeId>,
}

impl<V> OrderedTable<V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<V> Default for OrderedTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

// Link plumbing and cursors never hash, so they carry no hasher bounds.
impl<V, S> OrderedTable<V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            nodes: NodeArena::new(),
            head: None,
            tail: None,
            dangling: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn set_head(&mut self, to: Option<NodeId>) {
        if let Some(t) = to {
            self.nodes.retain(t);
        }
        if let Some(old) = core::mem::replace(&mut self.head, to) {
            self.nodes.release(old);
        }
    }

    fn set_tail(&mut self, to: Option<NodeId>) {
        if let Some(t) = to {
            self.nodes.retain(t);
        }
        if let Some(old) = core::mem::replace(&mut self.tail, to) {
            self.nodes.release(old);
        }
    }

    fn set_prev(&mut self, id: NodeId, prev: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.prev = prev;
        }
    }

    fn append(&mut self, id: NodeId) {
        match self.tail {
            None => {
                self.set_head(Some(id));
                self.set_tail(Some(id));
            }
            Some(t) => {
                self.nodes.set_next(t, Some(id));
                self.set_prev(id, Some(t));
                self.set_tail(Some(id));
            }
        }
        self.reattach_dangling(id);
    }

    fn park_dangling(&mut self, id: NodeId) {
        let nodes = &self.nodes;
        self.dangling.retain(|&d| nodes.get(d).is_some());
        if nodes.get(id).is_some() {
            self.dangling.push(id);
        }
    }

    /// Point every still-allocated dead end at `to`, so cursors stranded on
    /// a deleted tail move on to whatever was appended after it.
    fn reattach_dangling(&mut self, to: NodeId) {
        for id in core::mem::take(&mut self.dangling) {
            let waiting = self
                .nodes
                .get(id)
                .is_some_and(|n| n.is_deleted() && n.next.is_none());
            if waiting && id != to {
                self.nodes.set_next(id, Some(to));
            }
        }
    }

    /// Detach an already-tombstoned node from the live chain. `prev`/`next`
    /// are the links it had while live.
    fn unlink(&mut self, v: NodeId, prev: Option<NodeId>, next: Option<NodeId>) {
        if self.head == Some(v) {
            if self.tail == Some(v) {
                // Last node standing stays as a dead sentinel: iterators
                // stop on it and the next put attaches after it.
                trace!("sole entry deleted; node kept as sentinel");
                return;
            }
            let Some(new_head) = next else {
                debug_assert!(false, "head without successor must also be tail");
                return;
            };
            self.set_head(Some(new_head));
            self.set_prev(new_head, None);
            if let Some(after) = self.nodes.next_of(new_head) {
                self.set_prev(after, Some(new_head));
            }
            return;
        }

        let Some(p) = prev else {
            debug_assert!(false, "interior live node without prev");
            return;
        };
        self.nodes.set_next(p, next);
        match next {
            Some(n) => self.set_prev(n, Some(p)),
            None => {
                self.set_tail(Some(p));
                self.park_dangling(v);
            }
        }
    }

    /// Tombstone every live entry, then collapse the list onto a fresh
    /// sentinel chained after the old tail. Returns the drained entries in
    /// insertion order so the caller decides when their destructors run.
    pub fn clear(&mut self) -> Vec<(CanonicalKey, V)> {
        let mut drained = Vec::with_capacity(self.index.len());
        let mut cur = self.head;
        while let Some(id) = cur {
            let Some(node) = self.nodes.get_mut(id) else {
                break;
            };
            cur = node.next;
            if let Some(kv) = node.tombstone() {
                drained.push(kv);
            }
        }

        if let Some(t) = self.tail {
            let dummy = self.nodes.alloc_sentinel(None);
            self.nodes.set_next(t, Some(dummy));
            self.set_head(Some(dummy));
            self.set_tail(Some(dummy));
            self.reattach_dangling(dummy);
        }

        self.index.clear();
        trace!(cleared = drained.len(), "table cleared");
        drained
    }

    /// Live entries from `head`, in insertion order. Borrows the table, so
    /// unlike a [`Cursor`] it cannot observe mutation.
    pub fn entries(&self) -> impl Iterator<Item = (&CanonicalKey, &V)> + '_ {
        let mut cur = self.head;
        core::iter::from_fn(move || loop {
            let node = self.nodes.get(cur?)?;
            cur = node.next;
            if let NodeState::Live { key, value } = &node.state {
                return Some((key, value));
            }
        })
    }

    /// Start a cursor on a fresh dummy whose successor is the current head.
    pub fn open_cursor(&mut self) -> Cursor {
        let dummy = self.nodes.alloc_sentinel(self.head);
        self.nodes.retain(dummy);
        if self.head.is_none() {
            self.park_dangling(dummy);
        }
        Cursor { at: dummy }
    }

    /// Skip the cursor over any run of tombstoned successors and report
    /// whether a live successor remains.
    pub fn has_next(&mut self, cursor: &mut Cursor) -> bool {
        let mut skipped = 0usize;
        let found = loop {
            let Some(n) = self.nodes.next_of(cursor.at) else {
                break false;
            };
            let deleted = match self.nodes.get(n) {
                Some(node) => node.is_deleted(),
                None => break false,
            };
            if !deleted {
                break true;
            }
            self.nodes.repoint(&mut cursor.at, n);
            skipped += 1;
        };
        if skipped > 1 {
            trace!(skipped, "cursor skipped tombstone run");
        }
        found
    }

    /// Move the cursor onto the next live entry and return it.
    pub fn advance(&mut self, cursor: &mut Cursor) -> Option<(&CanonicalKey, &V)> {
        if !self.has_next(cursor) {
            return None;
        }
        let n = self.nodes.next_of(cursor.at)?;
        self.nodes.repoint(&mut cursor.at, n);
        match &self.nodes.get(n)?.state {
            NodeState::Live { key, value } => Some((key, value)),
            NodeState::Tombstone => None,
        }
    }

    pub fn close_cursor(&mut self, cursor: Cursor) {
        self.nodes.release(cursor.at);
    }

    #[cfg(test)]
    pub(crate) fn allocated_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl<V, S> OrderedTable<V, S>
where
    S: BuildHasher,
{
    fn make_hash(&self, key: &CanonicalKey) -> u64 {
        self.hasher.hash_one(key)
    }

    fn find_node(&self, key: &CanonicalKey, hash: u64) -> Option<NodeId> {
        self.index
            .find(hash, |&id| {
                self.nodes
                    .get(id)
                    .and_then(Node::key)
                    .is_some_and(|k| k == key)
            })
            .copied()
    }

    /// Insert or update. A new key is appended at the tail; an existing key
    /// keeps its position and the replaced value is returned.
    pub fn put(&mut self, key: Key, value: V) -> Option<V> {
        let key = key.canonicalize();
        let hash = self.make_hash(&key);
        let id = match self.index.entry(
            hash,
            |&id| {
                self.nodes
                    .get(id)
                    .and_then(Node::key)
                    .is_some_and(|k| *k == key)
            },
            |&id| self.nodes.get(id).map_or(0, |n| n.hash),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => {
                let id = *o.get();
                return self
                    .nodes
                    .get_mut(id)
                    .and_then(Node::value_mut)
                    .map(|slot| core::mem::replace(slot, value));
            }
            hashbrown::hash_table::Entry::Vacant(v) => {
                let id = self.nodes.alloc_live(key, value, hash);
                let _ = v.insert(id);
                id
            }
        };
        self.append(id);
        None
    }

    pub fn get(&self, key: Key) -> Option<&V> {
        let key = key.canonicalize();
        let hash = self.make_hash(&key);
        let id = self.find_node(&key, hash)?;
        self.nodes.get(id).and_then(Node::value)
    }

    pub fn has(&self, key: Key) -> bool {
        let key = key.canonicalize();
        let hash = self.make_hash(&key);
        self.find_node(&key, hash).is_some()
    }

    /// Remove `key`, returning its value. The node is tombstoned in place so
    /// cursors that have not reached it yet step over it.
    pub fn delete(&mut self, key: Key) -> Option<V> {
        let key = key.canonicalize();
        let hash = self.make_hash(&key);
        let nodes = &self.nodes;
        let entry = self
            .index
            .find_entry(hash, |&id| {
                nodes.get(id).and_then(Node::key).is_some_and(|k| *k == key)
            })
            .ok()?;
        let (id, _) = entry.remove();

        // Tombstone before unlinking: dropping the list's counts may free
        // the node, and its payload must already be out by then.
        let node = self.nodes.get_mut(id)?;
        let (prev, next) = (node.prev, node.next);
        let removed = node.tombstone();
        self.unlink(id, prev, next);
        removed.map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn keys<V, S>(t: &OrderedTable<V, S>) -> Vec<f64> {
        t.entries().filter_map(|(k, _)| k.as_number()).collect()
    }

    fn drain<V: Clone, S>(t: &mut OrderedTable<V, S>, c: &mut Cursor) -> Vec<V> {
        let mut out = Vec::new();
        while let Some((_, v)) = t.advance(c) {
            out.push(v.clone());
        }
        out
    }

    /// Invariant: distinct keys iterate in first-insertion order; updates do not move.
    #[test]
    fn put_appends_and_updates_in_place() {
        let mut t: OrderedTable<&str> = OrderedTable::new();
        assert_eq!(t.put(3.into(), "c"), None);
        assert_eq!(t.put(1.into(), "a"), None);
        assert_eq!(t.put(2.into(), "b"), None);
        assert_eq!(t.put(3.0.into(), "C"), Some("c"));
        assert_eq!(t.size(), 3);
        assert_eq!(keys(&t), vec![3.0, 1.0, 2.0]);
        assert_eq!(t.get(3.into()), Some(&"C"));
    }

    /// Invariant: get/has/delete on absent keys report absence without side effects.
    #[test]
    fn absent_keys_are_not_errors() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        assert_eq!(t.get("x".into()), None);
        assert!(!t.has("x".into()));
        assert_eq!(t.delete("x".into()), None);
        t.put("y".into(), 1);
        assert_eq!(t.delete("x".into()), None);
        assert_eq!(t.size(), 1);
    }

    /// Invariant: deleting head, interior and tail keeps the live chain and
    /// tail pointer consistent for later appends.
    #[test]
    fn delete_positions() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..5 {
            t.put(i.into(), i);
        }
        assert_eq!(t.delete(0.into()), Some(0)); // head
        assert_eq!(t.delete(2.into()), Some(2)); // interior
        assert_eq!(t.delete(4.into()), Some(4)); // tail
        assert_eq!(keys(&t), vec![1.0, 3.0]);
        t.put(5.into(), 5);
        assert_eq!(keys(&t), vec![1.0, 3.0, 5.0]);
        assert_eq!(t.size(), 3);
        // No cursor holds the tombstones, so they are already reclaimed.
        assert_eq!(t.allocated_nodes(), 3);
    }

    /// Invariant: deleting the sole entry leaves one dead sentinel that later
    /// puts attach after.
    #[test]
    fn sole_entry_becomes_sentinel() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        t.put("k".into(), 1);
        assert_eq!(t.delete("k".into()), Some(1));
        assert!(t.is_empty());
        assert_eq!(t.allocated_nodes(), 1);
        t.put("k2".into(), 2);
        assert_eq!(t.entries().count(), 1);
        assert_eq!(t.delete("k2".into()), Some(2));
        assert_eq!(t.allocated_nodes(), 1);
    }

    /// Invariant: a cursor skips entries deleted after it was opened and sees
    /// entries appended before it reaches the end.
    #[test]
    fn cursor_tolerates_mutation() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..4 {
            t.put(i.into(), i);
        }
        let mut c = t.open_cursor();
        assert_eq!(t.advance(&mut c).map(|(_, v)| *v), Some(0));
        t.delete(1.into());
        t.delete(2.into());
        t.put(9.into(), 9);
        assert_eq!(drain(&mut t, &mut c), vec![3, 9]);
        t.close_cursor(c);
        assert_eq!(t.allocated_nodes(), 3);
    }

    /// Invariant: a cursor parked on a deleted node still reaches later nodes.
    #[test]
    fn cursor_parked_on_deleted_node() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..3 {
            t.put(i.into(), i);
        }
        let mut c = t.open_cursor();
        assert_eq!(t.advance(&mut c).map(|(_, v)| *v), Some(0));
        assert_eq!(t.advance(&mut c).map(|(_, v)| *v), Some(1));
        t.delete(1.into());
        t.delete(0.into());
        t.put(3.into(), 3);
        assert_eq!(drain(&mut t, &mut c), vec![2, 3]);
        t.close_cursor(c);
    }

    /// Invariant: clear tombstones everything; an old cursor runs into the
    /// post-clear sentinel and then sees entries put after the clear.
    #[test]
    fn clear_then_reuse_with_cursor() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..3 {
            t.put(i.into(), i);
        }
        let mut old = t.open_cursor();
        assert_eq!(t.advance(&mut old).map(|(_, v)| *v), Some(0));
        let drained = t.clear();
        assert_eq!(drained.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(t.size(), 0);
        assert!(!t.has(1.into()));

        t.put("x".into(), 7);
        assert!(t.has("x".into()));
        let mut fresh = t.open_cursor();
        assert_eq!(drain(&mut t, &mut fresh), vec![7]);
        assert_eq!(drain(&mut t, &mut old), vec![7]);
        t.close_cursor(fresh);
        t.close_cursor(old);
        // Sentinel plus "x".
        assert_eq!(t.allocated_nodes(), 2);
    }

    /// Invariant: clear on a never-populated table is a no-op.
    #[test]
    fn clear_empty_table() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        assert!(t.clear().is_empty());
        assert_eq!(t.allocated_nodes(), 0);
        let mut c = t.open_cursor();
        assert!(!t.has_next(&mut c));
        t.close_cursor(c);
        assert_eq!(t.allocated_nodes(), 0);
    }

    /// Invariant: a cursor opened on a never-populated table sees the first put.
    #[test]
    fn cursor_on_empty_table_sees_first_put() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        let mut c = t.open_cursor();
        t.put(1.into(), 1);
        t.put(2.into(), 2);
        assert_eq!(drain(&mut t, &mut c), vec![1, 2]);
        t.close_cursor(c);
    }

    /// Invariant: a cursor parked on a tail that is then deleted still
    /// reaches entries appended afterwards.
    #[test]
    fn cursor_parked_on_deleted_tail() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..3 {
            t.put(i.into(), i);
        }
        let mut c = t.open_cursor();
        assert_eq!(drain(&mut t, &mut c), vec![0, 1, 2]);
        t.delete(2.into());
        t.delete(1.into());
        assert!(!t.has_next(&mut c));
        t.put(7.into(), 7);
        assert_eq!(drain(&mut t, &mut c), vec![7]);

        // And across a clear: the stranded node runs into the new sentinel.
        t.delete(7.into());
        t.clear();
        t.put(8.into(), 8);
        assert_eq!(drain(&mut t, &mut c), vec![8]);
        t.close_cursor(c);
        assert_eq!(t.allocated_nodes(), 2);
    }

    /// Invariant: closing a cursor frees the tombstone chain it alone kept alive.
    #[test]
    fn closing_cursor_reclaims_tombstones() {
        let mut t: OrderedTable<i32> = OrderedTable::new();
        for i in 0..100 {
            t.put(i.into(), i);
        }
        let c = t.open_cursor();
        for i in 0..99 {
            t.delete(i.into());
        }
        // Dummy + 99 tombstones + the live tail.
        assert_eq!(t.allocated_nodes(), 101);
        t.close_cursor(c);
        assert_eq!(t.allocated_nodes(), 1);
    }

    /// Invariant: values displaced by put/delete/clear are returned, never
    /// dropped inside the table.
    #[test]
    fn displaced_values_are_handed_back() {
        struct Probe(Rc<Cell<u32>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }
        let drops = Rc::new(Cell::new(0));
        let mut t: OrderedTable<Probe> = OrderedTable::new();
        t.put(1.into(), Probe(drops.clone()));
        t.put(2.into(), Probe(drops.clone()));
        t.put(3.into(), Probe(drops.clone()));

        let old = t.put(1.into(), Probe(drops.clone()));
        assert_eq!(drops.get(), 0);
        drop(old);
        assert_eq!(drops.get(), 1);

        let removed = t.delete(2.into());
        assert_eq!(drops.get(), 1);
        drop(removed);
        assert_eq!(drops.get(), 2);

        let drained = t.clear();
        assert_eq!(drops.get(), 2);
        drop(drained);
        assert_eq!(drops.get(), 4);
    }

    /// Invariant: lookups still resolve correctly when every key collides.
    #[test]
    fn collision_handling_with_const_hasher() {
        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl core::hash::Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                0
            }
        }

        let mut t: OrderedTable<i32, ConstBuildHasher> =
            OrderedTable::with_hasher(ConstBuildHasher);
        t.put("a".into(), 1);
        t.put("b".into(), 2);
        t.put(0.into(), 3);
        t.put(().into(), 4);
        assert_eq!(t.get("a".into()), Some(&1));
        assert_eq!(t.get("b".into()), Some(&2));
        assert_eq!(t.get((-0.0).into()), Some(&3));
        assert_eq!(t.get(Key::Null), Some(&4));
        assert_eq!(t.delete("a".into()), Some(1));
        assert_eq!(t.get("b".into()), Some(&2));
    }
}
