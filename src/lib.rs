//! tombstone-table: the associative core behind a dynamic language's `Map`
//! and `Set`. Keys are unique under SameValueZero, iteration follows
//! insertion order, and an iterator opened before a mutation keeps going:
//! it sees later insertions it has not reached yet and skips entries deleted
//! after it was created.
//!
//! Internal Design:
//!
//! Summary
//! - Layers:
//!   - `key`: raw host keys, canonicalization (integers become doubles),
//!     SameValueZero equality and the matching hash.
//!   - `NodeArena<V>`: generational node storage (`slotmap`) with an
//!     explicit reference count per node.
//!   - `OrderedTable<V, S>`: `hashbrown::HashTable` index of node handles
//!     plus a doubly-linked list of the same nodes; owns the tombstone and
//!     unlink rules and the cursor primitives.
//!   - `Hashtable<V, S>`: public shared handle (`Rc<RefCell<_>>`) whose
//!     `Iter` can outlive individual mutations.
//!
//! Tombstones
//! - Deleting a node swaps its payload for the tombstone state, drops its
//!   `prev` link and keeps its `next` link. A cursor sitting at or before the
//!   node can still walk through it to the live nodes after it.
//! - Deleting the only live node leaves it in place as a dead sentinel so
//!   iterators stop on it and later puts attach after it.
//! - `clear` tombstones every live node and chains a fresh sentinel after
//!   the old tail, which becomes both head and tail.
//! - Deleting the tail leaves its tombstone with no successor. Such dead ends
//!   are remembered through generation-checked handles and pointed at the
//!   next appended node (or the `clear` sentinel), so a cursor stranded on
//!   one still sees later insertions.
//!
//! Reclamation
//! - `head`, `tail`, each `next` link and each open cursor hold one count on
//!   the node they point at. A node is freed when its count reaches zero,
//!   which in turn releases its `next` target. Live nodes are always reachable
//!   from `head`, so only tombstones are ever freed.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (no atomics, no locking). Mutation
//!   interleaved with iteration is supported; cross-thread use is not.
//! - Stored `u64` hashes drive all index probing after insertion.
//! - Values displaced by `put`, `delete` or `clear` are moved out and
//!   dropped after the table borrow ends, so their `Drop` may touch the
//!   table. `Clone` of a yielded value runs while the table is borrowed.

mod hashtable;
mod key;
mod node_arena;
mod ordered_table;
mod ordered_table_proptest;

// Public surface
pub use hashtable::{Exhausted, Hashtable, Iter};
pub use key::{same_value_zero, CanonicalKey, Key, ObjectId};
