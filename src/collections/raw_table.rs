//! Open addressing over an arena chunk.
//!
//! Slots hold `(hash, value)`. A hash of [`EMPTY`] marks a slot that was
//! never used and ends every probe; [`TOMBSTONE`] marks a removed entry that
//! probes walk past and inserts may take over. Keys that collide with either
//! sentinel are rehashed once before they reach the table.
//!
//! The probe sequence is quadratic, `idx = (idx + i*i) & (cap - 1)`, run for
//! at most `cap` steps. That sequence does not visit every slot of a
//! power-of-two table (from any start, a table of 8 reaches only 6 slots),
//! so an insert that runs out of steps grows the table and tries again.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::slice;
use tracing::{debug, error};

use super::lost_chunk;
use crate::alloc::{capacity_overflow, Arena, RawChunk, CHUNK_ALIGN};
use crate::hash::{next_pow2, u64_hash};

/// Hash value marking a removed slot.
pub const TOMBSTONE: u64 = 0xdead_dead_dead_dead;

/// Hash value marking a slot that was never used.
pub(crate) const EMPTY: u64 = 0;

/// Capacity of a table's first backing array.
pub const DEFAULT_SIZE: usize = 8;

/// Moves keys off the sentinel values.
#[inline]
pub(crate) fn normalize(hash: u64) -> u64 {
    if hash == EMPTY || hash == TOMBSTONE {
        u64_hash(hash)
    } else {
        hash
    }
}

#[inline]
fn step(idx: usize, i: usize, mask: usize) -> usize {
    idx.wrapping_add(i.wrapping_mul(i)) & mask
}

/// `value` is initialized exactly when `hash` is neither sentinel.
#[repr(C)]
pub(crate) struct Bucket<V> {
    hash: u64,
    value: MaybeUninit<V>,
}

impl<V> Bucket<V> {
    #[inline]
    fn is_live(&self) -> bool {
        self.hash != EMPTY && self.hash != TOMBSTONE
    }
}

enum Probe {
    Found(usize),
    Vacant { index: usize, tombstone: bool },
    Exhausted,
}

/// The probing and resizing algorithm shared by
/// [`HashMap`](super::HashMap) and [`HashSet`](super::HashSet).
///
/// The backing array is one owned chunk of `arena`; the table frees it on
/// resize and on drop.
pub(crate) struct RawTable<'a, V> {
    arena: &'a Arena,
    chunk: Option<RawChunk>,
    len: usize,
    cap: usize,
    tombstones: usize,
    _marker: PhantomData<V>,
}

impl<'a, V: Copy> RawTable<'a, V> {
    const BUCKET_ALIGN: () = assert!(
        mem::align_of::<Bucket<V>>() <= CHUNK_ALIGN,
        "value alignment exceeds chunk alignment"
    );

    pub(crate) fn new_in(arena: &'a Arena) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::BUCKET_ALIGN;

        Self {
            arena,
            chunk: None,
            len: 0,
            cap: 0,
            tombstones: 0,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn arena(&self) -> &'a Arena {
        self.arena
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn tombstones(&self) -> usize {
        self.tombstones
    }

    fn buckets(&self) -> &[Bucket<V>] {
        match self.chunk {
            Some(chunk) => unsafe { slice::from_raw_parts(chunk.as_ptr().cast(), self.cap) },
            None => &[],
        }
    }

    fn buckets_mut(&mut self) -> &mut [Bucket<V>] {
        match self.chunk {
            Some(chunk) => unsafe { slice::from_raw_parts_mut(chunk.as_ptr().cast(), self.cap) },
            None => &mut [],
        }
    }

    /// Walks the probe sequence of an already normalized hash.
    fn probe(&self, hash: u64) -> Probe {
        let mask = self.cap.wrapping_sub(1);
        let buckets = self.buckets();
        let mut idx = hash as usize & mask;
        let mut tombstone = None;

        for i in 0..self.cap {
            match buckets[idx].hash {
                EMPTY => {
                    return match tombstone {
                        Some(index) => Probe::Vacant {
                            index,
                            tombstone: true,
                        },
                        None => Probe::Vacant {
                            index: idx,
                            tombstone: false,
                        },
                    }
                }
                TOMBSTONE => {
                    if tombstone.is_none() {
                        tombstone = Some(idx);
                    }
                }
                found if found == hash => return Probe::Found(idx),
                _ => {}
            }
            idx = step(idx, i, mask);
        }

        Probe::Exhausted
    }

    fn find(&self, hash: u64) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        match self.probe(normalize(hash)) {
            Probe::Found(index) => Some(index),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, hash: u64) -> bool {
        self.find(hash).is_some()
    }

    pub(crate) fn get(&self, hash: u64) -> Option<&V> {
        let index = self.find(hash)?;
        Some(unsafe { self.buckets()[index].value.assume_init_ref() })
    }

    pub(crate) fn get_mut(&mut self, hash: u64) -> Option<&mut V> {
        let index = self.find(hash)?;
        Some(unsafe { self.buckets_mut()[index].value.assume_init_mut() })
    }

    /// Inserts or overwrites. Returns the previous value on overwrite.
    pub(crate) fn insert(&mut self, hash: u64, value: V) -> Option<V> {
        if self.len + self.tombstones >= self.cap {
            self.grow();
        }

        let hash = normalize(hash);
        loop {
            match self.probe(hash) {
                Probe::Found(index) => {
                    let slot = &mut self.buckets_mut()[index].value;
                    let old = mem::replace(slot, MaybeUninit::new(value));
                    return Some(unsafe { old.assume_init() });
                }
                Probe::Vacant { index, tombstone } => {
                    self.buckets_mut()[index] = Bucket {
                        hash,
                        value: MaybeUninit::new(value),
                    };
                    self.len += 1;
                    if tombstone {
                        self.tombstones -= 1;
                    }
                    return None;
                }
                Probe::Exhausted => {
                    debug!(
                        hash,
                        cap = self.cap,
                        len = self.len,
                        tombstones = self.tombstones,
                        "probe sequence exhausted"
                    );
                    self.grow();
                }
            }
        }
    }

    /// Leaves a tombstone in the key's slot.
    pub(crate) fn remove(&mut self, hash: u64) -> Option<V> {
        let index = self.find(hash)?;
        let bucket = &mut self.buckets_mut()[index];
        bucket.hash = TOMBSTONE;
        let value = unsafe { bucket.value.assume_init_read() };
        self.len -= 1;
        self.tombstones += 1;
        Some(value)
    }

    fn grow(&mut self) {
        let doubled = self
            .cap
            .checked_mul(2)
            .unwrap_or_else(|| capacity_overflow());
        self.resize(doubled);
    }

    /// Rebuilds the table with room for `size` slots, rounded up to a power
    /// of two and at least [`DEFAULT_SIZE`]. Never shrinks.
    pub(crate) fn resize(&mut self, size: usize) {
        let new_cap = next_pow2(size).max(DEFAULT_SIZE);
        if new_cap <= self.cap {
            return;
        }

        let bytes = new_cap
            .checked_mul(mem::size_of::<Bucket<V>>())
            .unwrap_or_else(|| capacity_overflow());
        debug!(
            from = self.cap,
            to = new_cap,
            len = self.len,
            tombstones = self.tombstones,
            "resize table"
        );

        let old_chunk = self.chunk.replace(self.arena.calloc_chunk(bytes));
        let old_cap = mem::replace(&mut self.cap, new_cap);
        self.len = 0;
        self.tombstones = 0;

        if let Some(old_chunk) = old_chunk {
            // The old array stays alive until every live entry is moved over,
            // even if a reinsert has to grow the new one again.
            let old = unsafe {
                slice::from_raw_parts(old_chunk.as_ptr().cast::<Bucket<V>>(), old_cap)
            };
            for bucket in old.iter().filter(|bucket| bucket.is_live()) {
                self.insert(bucket.hash, unsafe { bucket.value.assume_init_read() });
            }
            if let Err(err) = self.arena.free_chunk(Some(old_chunk.id())) {
                lost_chunk(err);
            }
        }
    }

    /// Makes sure `additional` more entries fit without a resize.
    pub(crate) fn reserve(&mut self, additional: usize) {
        let target = self
            .len
            .checked_add(additional)
            .unwrap_or_else(|| capacity_overflow());
        if target > self.cap {
            self.resize(target);
        }
    }

    /// Empties every slot, keeping the backing array.
    pub(crate) fn clear(&mut self) {
        for bucket in self.buckets_mut() {
            bucket.hash = EMPTY;
        }
        self.len = 0;
        self.tombstones = 0;
    }

    /// Inserts every entry of `other`, overwriting shared keys.
    pub(crate) fn update(&mut self, other: &RawTable<'_, V>) {
        self.reserve(other.len);
        for (hash, value) in other.iter() {
            self.insert(hash, *value);
        }
    }

    pub(crate) fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (u64, V)>,
    {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (hash, value) in iter {
            self.insert(hash, value);
        }
    }

    pub(crate) fn iter(&self) -> Iter<'_, V> {
        Iter {
            buckets: self.buckets().iter(),
            remaining: self.len,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, V> {
        let remaining = self.len;
        IterMut {
            buckets: self.buckets_mut().iter_mut(),
            remaining,
        }
    }

    pub(crate) fn is_subset(&self, other: &RawTable<'_, V>) -> bool {
        self.len <= other.len && self.iter().all(|(hash, _)| other.contains(hash))
    }

    pub(crate) fn is_disjoint(&self, other: &RawTable<'_, V>) -> bool {
        if self.len <= other.len {
            self.iter().all(|(hash, _)| !other.contains(hash))
        } else {
            other.iter().all(|(hash, _)| !self.contains(hash))
        }
    }

    /// Both tables hold exactly the same keys.
    pub(crate) fn same_keys(&self, other: &RawTable<'_, V>) -> bool {
        self.len == other.len && self.is_subset(other)
    }

    /// Entries of `self` whose key is also in `other`.
    pub(crate) fn intersection_into(&self, other: &RawTable<'_, V>, out: &mut RawTable<'_, V>) {
        out.reserve(self.len.min(other.len));
        if self.len <= other.len {
            for (hash, value) in self.iter() {
                if other.contains(hash) {
                    out.insert(hash, *value);
                }
            }
        } else {
            for (hash, _) in other.iter() {
                if let Some(value) = self.get(hash) {
                    out.insert(hash, *value);
                }
            }
        }
    }

    /// Entries of `self` whose key is not in `other`.
    pub(crate) fn difference_into(&self, other: &RawTable<'_, V>, out: &mut RawTable<'_, V>) {
        out.reserve(self.len);
        for (hash, value) in self.iter() {
            if !other.contains(hash) {
                out.insert(hash, *value);
            }
        }
    }

    /// Every entry of `self`, then the entries of `other` whose key `self`
    /// lacks.
    pub(crate) fn union_into(&self, other: &RawTable<'_, V>, out: &mut RawTable<'_, V>) {
        out.reserve(self.len.max(other.len));
        for (hash, value) in self.iter() {
            out.insert(hash, *value);
        }
        for (hash, value) in other.iter() {
            if !self.contains(hash) {
                out.insert(hash, *value);
            }
        }
    }

    /// Recounts the slots and checks them against the counters.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        if self.cap != 0 {
            assert!(self.cap.is_power_of_two(), "cap {} is not a power of two", self.cap);
        }
        assert!(self.len + self.tombstones <= self.cap);

        let live = self.buckets().iter().filter(|b| b.is_live()).count();
        let dead = self.buckets().iter().filter(|b| b.hash == TOMBSTONE).count();
        assert_eq!(live, self.len);
        assert_eq!(dead, self.tombstones);

        let mut seen = std::collections::HashSet::new();
        for (hash, _) in self.iter() {
            assert!(seen.insert(hash), "hash {:#x} stored twice", hash);
        }
    }
}

impl<'a, V> Drop for RawTable<'a, V> {
    fn drop(&mut self) {
        if let Some(chunk) = self.chunk.take() {
            if let Err(err) = self.arena.free_chunk(Some(chunk.id())) {
                error!(%err, "table backing chunk already released");
            }
        }
    }
}

/// Live `(hash, &value)` pairs in slot order.
pub struct Iter<'t, V> {
    buckets: slice::Iter<'t, Bucket<V>>,
    remaining: usize,
}

impl<'t, V> Iterator for Iter<'t, V> {
    type Item = (u64, &'t V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.buckets.find(|bucket| bucket.is_live())?;
        self.remaining -= 1;
        Some((bucket.hash, unsafe { bucket.value.assume_init_ref() }))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            buckets: self.buckets.clone(),
            remaining: self.remaining,
        }
    }
}

pub struct IterMut<'t, V> {
    buckets: slice::IterMut<'t, Bucket<V>>,
    remaining: usize,
}

impl<'t, V> Iterator for IterMut<'t, V> {
    type Item = (u64, &'t mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.buckets.find(|bucket| bucket.is_live())?;
        self.remaining -= 1;
        Some((bucket.hash, unsafe { bucket.value.assume_init_mut() }))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}
impl<V> FusedIterator for IterMut<'_, V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap as Model;

    #[test]
    fn starts_without_backing_array() {
        let arena = Arena::new();
        let table = RawTable::<u64>::new_in(&arena);
        assert_eq!(table.capacity(), 0);
        assert!(table.chunk.is_none());
        assert_eq!(table.get(1), None);
        assert_eq!(arena.chunk_count(), 0);
    }

    #[test]
    fn first_insert_allocates_default_size() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        table.insert(1, 420u64);
        table.insert(2, 42);
        table.insert(3, 69);

        assert_eq!(table.capacity(), DEFAULT_SIZE);
        assert_eq!(table.len(), 3);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(arena.chunk_count(), 1);
        assert_eq!(arena.size(), DEFAULT_SIZE * mem::size_of::<Bucket<u64>>());

        assert_eq!(table.remove(2), Some(42));
        assert_eq!(table.capacity(), DEFAULT_SIZE);
        assert_eq!(table.tombstones(), 1);
        assert_eq!(table.len(), 2);

        table.resize(10);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(&420));
        assert_eq!(table.get(3), Some(&69));

        // The old array went back to the arena.
        assert_eq!(arena.chunk_count(), 1);
        table.assert_invariants();
    }

    #[test]
    fn resize_never_shrinks() {
        let arena = Arena::new();
        let mut table: RawTable<u32> = RawTable::new_in(&arena);
        table.resize(64);
        table.resize(3);
        table.resize(64);
        assert_eq!(table.capacity(), 64);
    }

    #[test]
    fn tombstone_is_reused_before_empty_slot() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        // 8 and 16 share home slot 0 in a table of 8.
        table.insert(8, 1u32);
        table.insert(16, 2);
        table.remove(8);
        assert_eq!(table.tombstones(), 1);

        table.insert(24, 3);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.buckets()[0].hash, 24);
        assert_eq!(table.get(16), Some(&2));
        table.assert_invariants();
    }

    #[test]
    fn lookup_walks_past_tombstones() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        table.insert(8, 1u32);
        table.insert(16, 2);
        table.insert(24, 3);
        table.remove(16);

        assert_eq!(table.get(24), Some(&3));
        assert_eq!(table.get(16), None);
        assert_eq!(table.remove(16), None);
    }

    #[test]
    fn upsert_past_a_tombstone_finds_existing_slot() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        table.insert(8, 1u32);
        table.insert(16, 2);
        table.remove(8);

        assert_eq!(table.insert(16, 5), Some(2));
        assert_eq!(table.len(), 1);
        assert_eq!(table.tombstones(), 1);
        table.assert_invariants();
    }

    #[test]
    fn exhausted_probe_grows_the_table() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);

        // Every multiple of 8 starts at slot 0 of a table of 8, and that
        // probe sequence only reaches slots 0, 1, 3, 5, 6 and 7.
        for k in 1..=6u64 {
            table.insert(8 * k, k);
        }
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.len(), 6);

        table.insert(56, 7);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 7);
        for k in 1..=7u64 {
            assert_eq!(table.get(8 * k), Some(&k));
        }
        table.assert_invariants();
    }

    #[test]
    fn quadratic_probe_coverage() {
        // Number of distinct slots one probe sequence reaches.
        fn coverage(cap: usize) -> usize {
            let mask = cap - 1;
            let mut idx = 0;
            let mut seen = vec![false; cap];
            for i in 0..cap {
                seen[idx] = true;
                idx = step(idx, i, mask);
            }
            seen.into_iter().filter(|s| *s).count()
        }

        assert_eq!(coverage(8), 6);
        assert_eq!(coverage(16), 10);
        for shift in 3..12 {
            let cap = 1usize << shift;
            assert!(coverage(cap) < cap, "cap {} fully covered", cap);
        }
    }

    #[test]
    fn sentinel_keys_round_trip() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        table.insert(0, 10i64);
        table.insert(TOMBSTONE, 20);

        assert_eq!(table.get(0), Some(&10));
        assert_eq!(table.get(TOMBSTONE), Some(&20));
        assert!(table.iter().all(|(hash, _)| hash != 0 && hash != TOMBSTONE));

        assert_eq!(table.remove(0), Some(10));
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(TOMBSTONE), Some(&20));
        table.assert_invariants();
    }

    #[test]
    fn clear_keeps_capacity() {
        let arena = Arena::new();
        let mut table = RawTable::new_in(&arena);
        for hash in 1..20 {
            table.insert(hash, hash);
        }
        table.remove(3);
        let cap = table.capacity();

        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.capacity(), cap);
        assert_eq!(table.get(1), None);
        table.assert_invariants();
    }

    #[test]
    fn reserve_only_grows_when_needed() {
        let arena = Arena::new();
        let mut table = RawTable::<u8>::new_in(&arena);
        table.reserve(0);
        assert_eq!(table.capacity(), 0);

        table.reserve(5);
        assert_eq!(table.capacity(), 8);
        table.reserve(8);
        assert_eq!(table.capacity(), 8);
        table.reserve(9);
        assert_eq!(table.capacity(), 16);
    }

    #[test]
    fn drop_returns_backing_chunk() {
        let arena = Arena::new();
        {
            let mut table = RawTable::new_in(&arena);
            table.insert(1, 1u8);
            assert_eq!(arena.chunk_count(), 1);
        }
        assert_eq!(arena.chunk_count(), 0);
    }

    #[test]
    fn randomized_against_model() {
        let arena = Arena::new();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for round in 0..8 {
            let mut table = RawTable::new_in(&arena);
            let mut model = Model::new();
            // A small key space forces collisions, upserts and tombstone reuse.
            let keys = 16 << round;

            for op in 0..4000 {
                let hash = rng.gen_range(0..keys) as u64;
                if rng.gen_bool(0.6) {
                    let value = rng.gen::<u32>();
                    assert_eq!(table.insert(hash, value), model.insert(hash, value));
                } else {
                    assert_eq!(table.remove(hash), model.remove(&hash));
                }

                if op % 500 == 0 {
                    table.resize(table.capacity() * 2);
                }
                assert!(table.len() + table.tombstones() <= table.capacity());
            }

            table.assert_invariants();
            assert_eq!(table.len(), model.len());
            for (hash, value) in &model {
                assert_eq!(table.get(*hash), Some(value));
            }
            for hash in 0..keys as u64 {
                assert_eq!(table.contains(hash), model.contains_key(&hash));
            }
        }
    }

    #[test]
    fn small_tables_under_churn() {
        let arena = Arena::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut table = RawTable::new_in(&arena);
        let mut model = Model::new();

        // Keys sharing low bits pile onto the same probe sequences.
        for _ in 0..20_000 {
            let hash = (rng.gen_range(0..32u64)) << 8;
            if rng.gen_bool(0.5) {
                table.insert(hash, ());
                model.insert(hash, ());
            } else {
                assert_eq!(table.remove(hash).is_some(), model.remove(&hash).is_some());
            }
            assert!(table.len() + table.tombstones() <= table.capacity());
        }

        table.assert_invariants();
        assert_eq!(table.len(), model.len());
    }

    #[test]
    fn algebra_helpers() {
        let arena = Arena::new();
        let mut a = RawTable::new_in(&arena);
        let mut b = RawTable::new_in(&arena);
        a.extend([(1, 'a'), (2, 'b'), (3, 'c')]);
        b.extend([(3, 'C'), (4, 'D')]);

        let mut out = RawTable::new_in(&arena);
        a.union_into(&b, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out.get(3), Some(&'c'));
        assert_eq!(out.get(4), Some(&'D'));

        let mut out = RawTable::new_in(&arena);
        b.intersection_into(&a, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(3), Some(&'C'));

        let mut out = RawTable::new_in(&arena);
        a.difference_into(&b, &mut out);
        assert!(out.same_keys(&{
            let mut t = RawTable::new_in(&arena);
            t.extend([(1, '-'), (2, '-')]);
            t
        }));

        assert!(!a.is_disjoint(&b));
        assert!(!a.is_subset(&b));
        a.update(&b);
        assert!(b.is_subset(&a));
        assert_eq!(a.get(3), Some(&'C'));
    }
}
