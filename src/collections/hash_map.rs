use std::fmt;
use std::iter::FusedIterator;

use super::raw_table::RawTable;
pub use super::raw_table::{Iter, IterMut};
use crate::Arena;

/// Map from caller-computed 64-bit hashes to `Copy` values, stored in an
/// [`Arena`].
///
/// The map never sees the original keys: two keys with the same hash are
/// the same key. Capacity is always a power of two and doubles whenever
/// live entries plus tombstones fill the table.
///
/// ```
/// use chunkmap::{Arena, HashMap};
///
/// let arena = Arena::new();
/// let mut map = HashMap::new_in(&arena);
/// assert_eq!(map.insert(7, 1.5f64), None);
/// assert_eq!(map.insert(7, 2.5), Some(1.5));
/// assert_eq!(map.get(7), Some(&2.5));
/// ```
pub struct HashMap<'a, V> {
    table: RawTable<'a, V>,
}

impl<'a, V: Copy> HashMap<'a, V> {
    /// Creates an empty map. Nothing is allocated until the first insert.
    pub fn new_in(arena: &'a Arena) -> Self {
        Self {
            table: RawTable::new_in(arena),
        }
    }

    /// Creates a map with at least `capacity` slots. Filling it can still
    /// grow the table: the quadratic probe does not reach every slot.
    pub fn with_capacity_in(arena: &'a Arena, capacity: usize) -> Self {
        let mut map = Self::new_in(arena);
        map.reserve(capacity);
        map
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

    /// Number of slots in the backing array.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Slots holding a removed entry. They are reclaimed by later inserts
    /// or by the next resize.
    #[inline]
    pub fn tombstones(&self) -> usize {
        self.table.tombstones()
    }

    /// Inserts `value` under `hash`, returning the value it replaced.
    pub fn insert(&mut self, hash: u64, value: V) -> Option<V> {
        self.table.insert(hash, value)
    }

    pub fn get(&self, hash: u64) -> Option<&V> {
        self.table.get(hash)
    }

    pub fn get_mut(&mut self, hash: u64) -> Option<&mut V> {
        self.table.get_mut(hash)
    }

    pub fn contains_key(&self, hash: u64) -> bool {
        self.table.contains(hash)
    }

    /// Removes `hash`, returning its value if it was present.
    pub fn remove(&mut self, hash: u64) -> Option<V> {
        self.table.remove(hash)
    }

    /// Grows the table to at least `size` slots. Never shrinks.
    pub fn resize(&mut self, size: usize) {
        self.table.resize(size)
    }

    /// Makes room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional)
    }

    /// Removes every entry, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear()
    }

    /// Copies every entry of `other` into `self`; shared keys take the
    /// value from `other`.
    pub fn update(&mut self, other: &HashMap<'_, V>) {
        self.table.update(&other.table)
    }

    /// Entries in slot order. Keys that were 0 or
    /// [`TOMBSTONE`](super::TOMBSTONE) show up as their rehashed value.
    pub fn iter(&self) -> Iter<'_, V> {
        self.table.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        self.table.iter_mut()
    }

    pub fn keys(&self) -> Keys<'_, V> {
        Keys {
            inner: self.table.iter(),
        }
    }

    pub fn values(&self) -> Values<'_, V> {
        Values {
            inner: self.table.iter(),
        }
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, V> {
        ValuesMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Every key of `self` is in `other`.
    pub fn is_subset(&self, other: &HashMap<'_, V>) -> bool {
        self.table.is_subset(&other.table)
    }

    /// `self` and `other` share no key.
    pub fn is_disjoint(&self, other: &HashMap<'_, V>) -> bool {
        self.table.is_disjoint(&other.table)
    }

    /// Keys present in both maps, with the values of `self`. The result
    /// lives in the arena of `self`.
    pub fn intersection(&self, other: &HashMap<'_, V>) -> HashMap<'a, V> {
        let mut out = HashMap::new_in(self.arena());
        self.table.intersection_into(&other.table, &mut out.table);
        out
    }

    /// Entries of `self` whose key is not in `other`.
    pub fn difference(&self, other: &HashMap<'_, V>) -> HashMap<'a, V> {
        let mut out = HashMap::new_in(self.arena());
        self.table.difference_into(&other.table, &mut out.table);
        out
    }

    /// Every key of either map. Values come from `self` where both maps
    /// hold the key.
    pub fn union(&self, other: &HashMap<'_, V>) -> HashMap<'a, V> {
        let mut out = HashMap::new_in(self.arena());
        self.table.union_into(&other.table, &mut out.table);
        out
    }
}

impl<V: Copy> Extend<(u64, V)> for HashMap<'_, V> {
    fn extend<I: IntoIterator<Item = (u64, V)>>(&mut self, iter: I) {
        self.table.extend(iter)
    }
}

impl<'m, V: Copy> Extend<(u64, &'m V)> for HashMap<'_, V> {
    fn extend<I: IntoIterator<Item = (u64, &'m V)>>(&mut self, iter: I) {
        self.table
            .extend(iter.into_iter().map(|(hash, value)| (hash, *value)))
    }
}

impl<'m, 'a, V: Copy> IntoIterator for &'m HashMap<'a, V> {
    type Item = (u64, &'m V);
    type IntoIter = Iter<'m, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'m, 'a, V: Copy> IntoIterator for &'m mut HashMap<'a, V> {
    type Item = (u64, &'m mut V);
    type IntoIter = IterMut<'m, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Same keys mapped to equal values.
impl<V: Copy + PartialEq> PartialEq<HashMap<'_, V>> for HashMap<'_, V> {
    fn eq(&self, other: &HashMap<'_, V>) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(hash, value)| other.get(hash) == Some(value))
    }
}

impl<V: Copy + Eq> Eq for HashMap<'_, V> {}

impl<V: Copy + fmt::Debug> fmt::Debug for HashMap<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl<V: Copy + serde::Serialize> serde::Serialize for HashMap<'_, V> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

pub struct Keys<'t, V> {
    inner: Iter<'t, V>,
}

impl<V> Iterator for Keys<'_, V> {
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

impl<V> ExactSizeIterator for Keys<'_, V> {}
impl<V> FusedIterator for Keys<'_, V> {}

pub struct Values<'t, V> {
    inner: Iter<'t, V>,
}

impl<'t, V> Iterator for Values<'t, V> {
    type Item = &'t V;

    #[inline]
    fn next(&mut self) -> Option<&'t V> {
        self.inner.next().map(|(_, value)| value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for Values<'_, V> {}
impl<V> FusedIterator for Values<'_, V> {}

pub struct ValuesMut<'t, V> {
    inner: IterMut<'t, V>,
}

impl<'t, V> Iterator for ValuesMut<'t, V> {
    type Item = &'t mut V;

    #[inline]
    fn next(&mut self) -> Option<&'t mut V> {
        self.inner.next().map(|(_, value)| value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> ExactSizeIterator for ValuesMut<'_, V> {}
impl<V> FusedIterator for ValuesMut<'_, V> {}
