use std::fmt;
use std::iter::FusedIterator;

use super::raw_table::{self, RawTable};
use crate::Arena;

/// Set of 64-bit hashes stored in an [`Arena`].
///
/// Shares its probing and growth with [`HashMap`](super::HashMap); slots
/// carry no value.
pub struct HashSet<'a> {
    table: RawTable<'a, ()>,
}

impl<'a> HashSet<'a> {
    /// Creates an empty set. Nothing is allocated until the first insert.
    pub fn new_in(arena: &'a Arena) -> Self {
        Self {
            table: RawTable::new_in(arena),
        }
    }

    /// Creates a set with at least `capacity` slots. Filling it can still
    /// grow the table: the quadratic probe does not reach every slot.
    pub fn with_capacity_in(arena: &'a Arena, capacity: usize) -> Self {
        let mut set = Self::new_in(arena);
        set.reserve(capacity);
        set
    }

    #[inline]
    pub fn arena(&self) -> &'a Arena {
        self.table.arena()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn tombstones(&self) -> usize {
        self.table.tombstones()
    }

    /// Adds `hash`. Returns whether the set has changed.
    #[inline]
    pub fn insert(&mut self, hash: u64) -> bool {
        self.table.insert(hash, ()).is_none()
    }

    /// Returns `true` if `self` contains `hash`.
    #[inline]
    pub fn contains(&self, hash: u64) -> bool {
        self.table.contains(hash)
    }

    /// Removes `hash`. Returns whether it was present.
    #[inline]
    pub fn remove(&mut self, hash: u64) -> bool {
        self.table.remove(hash).is_some()
    }

    pub fn resize(&mut self, size: usize) {
        self.table.resize(size)
    }

    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional)
    }

    /// Clear all elements, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear()
    }

    /// Adds every element of `other`.
    pub fn update(&mut self, other: &HashSet<'_>) {
        self.table.update(&other.table)
    }

    /// Elements in slot order. 0 and [`TOMBSTONE`](super::TOMBSTONE) show up
    /// as their rehashed value.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Is `self` a (non-strict) subset of `other`?
    pub fn is_subset(&self, other: &HashSet<'_>) -> bool {
        self.table.is_subset(&other.table)
    }

    /// Is `self` a (non-strict) superset of `other`?
    pub fn is_superset(&self, other: &HashSet<'_>) -> bool {
        other.is_subset(self)
    }

    pub fn is_disjoint(&self, other: &HashSet<'_>) -> bool {
        self.table.is_disjoint(&other.table)
    }

    /// Elements of either set, allocated in the arena of `self`.
    pub fn union(&self, other: &HashSet<'_>) -> HashSet<'a> {
        let mut out = HashSet::new_in(self.arena());
        self.table.union_into(&other.table, &mut out.table);
        out
    }

    /// Elements of both sets, allocated in the arena of `self`.
    pub fn intersection(&self, other: &HashSet<'_>) -> HashSet<'a> {
        let mut out = HashSet::new_in(self.arena());
        self.table.intersection_into(&other.table, &mut out.table);
        out
    }

    /// Elements of `self` missing from `other`, allocated in the arena of
    /// `self`.
    pub fn difference(&self, other: &HashSet<'_>) -> HashSet<'a> {
        let mut out = HashSet::new_in(self.arena());
        self.table.difference_into(&other.table, &mut out.table);
        out
    }
}

impl Extend<u64> for HashSet<'_> {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.table.extend(iter.into_iter().map(|hash| (hash, ())))
    }
}

impl<'h> Extend<&'h u64> for HashSet<'_> {
    fn extend<I: IntoIterator<Item = &'h u64>>(&mut self, iter: I) {
        self.table.extend(iter.into_iter().map(|hash| (*hash, ())))
    }
}

impl<'s> IntoIterator for &'s HashSet<'_> {
    type Item = u64;
    type IntoIter = Iter<'s>;

    fn into_iter(self) -> Iter<'s> {
        self.iter()
    }
}

impl PartialEq<HashSet<'_>> for HashSet<'_> {
    fn eq(&self, other: &HashSet<'_>) -> bool {
        self.table.same_keys(&other.table)
    }
}

impl Eq for HashSet<'_> {}

impl fmt::Debug for HashSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for HashSet<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

pub struct Iter<'s> {
    inner: raw_table::Iter<'s, ()>,
}

impl Iterator for Iter<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        self.inner.next().map(|(hash, _)| hash)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}
impl FusedIterator for Iter<'_> {}
