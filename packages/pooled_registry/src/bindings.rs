use std::fmt;
use std::hash::Hash;

use foldhash::fast::RandomState;
use scc::hash_index::Entry as IndexEntry;
use scc::{Equivalent, HashIndex};

use crate::Identifier;

/// Associates identifiers with small copyable values, optimized for frequent concurrent
/// lookups interleaved with comparatively rare writes.
///
/// Lookups never lock: they locate the binding and copy the value while protected by an
/// epoch guard. Writes replace a binding by publishing a new node and retiring the old one.
///
/// Every write that unlinks a value hands it back to the caller, so whatever the value stands
/// for can be released right away instead of whenever the retired node is reclaimed. A
/// concurrent lookup may still return a value that was unlinked a moment ago and has to cope
/// with that.
///
/// Writes to the same identifier are serialized by a writer lock on the bucket that holds it.
/// Readers never take that lock.
pub(crate) struct Bindings<V>
where
    V: Copy + 'static,
{
    index: HashIndex<Identifier, V, RandomState>,
}

impl<V> Bindings<V>
where
    V: Copy + 'static,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashIndex::with_capacity_and_hasher(capacity, RandomState::default()),
        }
    }

    /// Binds `value` to `id`, atomically replacing any existing binding.
    ///
    /// Returns the replaced value, if there was one.
    pub(crate) fn upsert(&self, id: Identifier, value: V) -> Option<V> {
        match self.index.entry(id) {
            IndexEntry::Occupied(occupied) => {
                let replaced = *occupied.get();
                occupied.update(value);
                Some(replaced)
            }
            IndexEntry::Vacant(vacant) => {
                vacant.insert_entry(value);
                None
            }
        }
    }

    /// Returns the value currently bound to `id`.
    #[must_use]
    pub(crate) fn lookup<Q>(&self, id: &Q) -> Option<V>
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        self.index.peek_with(id, |_, value| *value)
    }

    #[must_use]
    pub(crate) fn contains<Q>(&self, id: &Q) -> bool
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        self.index.contains(id)
    }

    /// Removes the binding of `id` and returns its value, if there was one.
    pub(crate) fn remove<Q>(&self, id: &Q) -> Option<V>
    where
        Q: Equivalent<Identifier> + Hash + ?Sized,
    {
        let mut removed = None;

        self.index.remove_if(id, |value| {
            removed = Some(*value);
            true
        });

        removed
    }

    /// Removes every binding and returns the removed values.
    ///
    /// Bindings created concurrently with the drain may or may not be part of it.
    pub(crate) fn drain(&self) -> Vec<V> {
        let mut removed = Vec::new();

        self.index.retain(|_, value| {
            removed.push(*value);
            false
        });

        removed
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }
}

impl<V> fmt::Debug for Bindings<V>
where
    V: Copy + 'static,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
