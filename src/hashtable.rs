use crate::key::{CanonicalKey, Key};
use crate::ordered_table::{Cursor, OrderedTable};
use core::cell::RefCell;
use core::fmt;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use std::rc::Rc;

/// Insertion-ordered table with SameValueZero keys whose iterators keep
/// working while the table is mutated.
///
/// `Hashtable` is a shared handle: cloning it yields another handle to the
/// same table, and every operation takes `&self`. That is what lets an
/// [`Iter`] stay open across `put`/`delete`/`clear` calls.
pub struct Hashtable<V, S = std::collections::hash_map::RandomState> {
    inner: Rc<RefCell<OrderedTable<V, S>>>,
}

/// Returned by [`Iter::try_next`] once nothing is left to yield.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("iterator has no more elements")]
pub struct Exhausted;

impl<V> Hashtable<V> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(OrderedTable::new())),
        }
    }
}

impl<V> Default for Hashtable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> Clone for Hashtable<V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, S> Hashtable<V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OrderedTable::with_hasher(hasher))),
        }
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.inner.borrow().size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Remove every entry. Open iterators treat the removed entries as
    /// deleted and continue with whatever is put afterwards.
    pub fn clear(&self) {
        let drained = self.inner.borrow_mut().clear();
        // Values are dropped only after the table is released.
        drop(drained);
    }

    /// Iterate live entries in insertion order as observed while iterating.
    pub fn iter(&self) -> Iter<V, S> {
        let cursor = self.inner.borrow_mut().open_cursor();
        Iter {
            owner: self.inner.clone(),
            cursor: Some(cursor),
        }
    }

    /// True when both handles refer to the same table.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<V, S> Hashtable<V, S>
where
    S: BuildHasher,
{
    /// Insert `value` under `key`. Re-putting an existing key replaces the
    /// value in place, keeps its iteration position, and returns the old value.
    pub fn put(&self, key: impl Into<Key>, value: V) -> Option<V> {
        self.inner.borrow_mut().put(key.into(), value)
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<V>
    where
        V: Clone,
    {
        self.inner.borrow().get(key.into()).cloned()
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.inner.borrow().has(key.into())
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete(&self, key: impl Into<Key>) -> Option<V> {
        self.inner.borrow_mut().delete(key.into())
    }
}

impl<V: fmt::Debug, S> fmt::Debug for Hashtable<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(t) => f.debug_map().entries(t.entries()).finish(),
            Err(_) => f.write_str("Hashtable { <borrowed> }"),
        }
    }
}

/// Lazy, forward-only iterator over a [`Hashtable`].
///
/// Not a snapshot: entries put before the iterator reaches the end are
/// yielded, entries deleted before it reaches them are skipped. Once it
/// reports the end it stays exhausted; ask the table for a new one to start
/// over.
pub struct Iter<V, S = std::collections::hash_map::RandomState> {
    owner: Rc<RefCell<OrderedTable<V, S>>>,
    cursor: Option<Cursor>,
}

impl<V, S> Iter<V, S> {
    /// Whether another entry will be yielded. Skips past entries deleted
    /// since the last step.
    pub fn has_next(&mut self) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        let more = self.owner.borrow_mut().has_next(cursor);
        if !more {
            self.finish();
        }
        more
    }

    /// Like [`Iterator::next`], but reports the end as an error.
    pub fn try_next(&mut self) -> Result<(CanonicalKey, V), Exhausted>
    where
        V: Clone,
    {
        self.next().ok_or(Exhausted)
    }

    fn finish(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            // If the table is mid-operation the count is left behind and the
            // node goes away with the table instead.
            if let Ok(mut t) = self.owner.try_borrow_mut() {
                t.close_cursor(cursor);
            }
        }
    }
}

impl<V: Clone, S> Iterator for Iter<V, S> {
    type Item = (CanonicalKey, V);

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        let item = self
            .owner
            .borrow_mut()
            .advance(cursor)
            .map(|(k, v)| (k.clone(), v.clone()));
        if item.is_none() {
            self.finish();
        }
        item
    }
}

impl<V: Clone, S> FusedIterator for Iter<V, S> {}

impl<V, S> Drop for Iter<V, S> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<'a, V: Clone, S> IntoIterator for &'a Hashtable<V, S> {
    type Item = (CanonicalKey, V);
    type IntoIter = Iter<V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
