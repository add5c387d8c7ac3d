use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;
use tracing::error;

use super::lost_chunk;
use crate::alloc::{capacity_overflow, RawChunk, CHUNK_ALIGN};
use crate::Arena;

const DEFAULT_CAPACITY: usize = 5;

/// Growable array whose buffer is an owned chunk of an [`Arena`].
///
/// Growth goes through [`Arena::realloc_chunk`], so the buffer keeps its
/// handle while its address may change. Elements are dropped with the
/// `Vec`; the chunk goes back to the arena at the same time.
pub struct Vec<'a, T> {
    arena: &'a Arena,
    buffer: Option<RawChunk>,
    capacity: usize,
    size: usize,
    _marker: PhantomData<T>,
}

impl<'a, T> Vec<'a, T> {
    const ELEM_ALIGN: () = assert!(
        mem::align_of::<T>() <= CHUNK_ALIGN,
        "element alignment exceeds chunk alignment"
    );

    pub fn new_in(arena: &'a Arena) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::ELEM_ALIGN;

        Self {
            arena,
            buffer: None,
            capacity: 0,
            size: 0,
            _marker: PhantomData,
        }
    }

    pub fn with_capacity_in(arena: &'a Arena, capacity: usize) -> Self {
        let mut vec = Self::new_in(arena);
        if capacity > 0 {
            vec.set_capacity(capacity);
        }
        vec
    }

    #[inline]
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ptr(&self) -> *mut T {
        match self.buffer {
            Some(buffer) => buffer.as_ptr().cast(),
            None => NonNull::dangling().as_ptr(),
        }
    }

    fn set_capacity(&mut self, capacity: usize) {
        let bytes = capacity
            .checked_mul(mem::size_of::<T>())
            .unwrap_or_else(|| capacity_overflow());
        let id = self.buffer.map(|buffer| buffer.id());
        match self.arena.realloc_chunk(id, bytes) {
            Ok(buffer) => self.buffer = Some(buffer),
            Err(err) => lost_chunk(err),
        }
        self.capacity = capacity;
    }

    /// Makes room for `additional` more elements, starting at five and
    /// doubling from there.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .size
            .checked_add(additional)
            .unwrap_or_else(|| capacity_overflow());
        if required <= self.capacity {
            return;
        }

        let mut capacity = self.capacity.max(DEFAULT_CAPACITY);
        while capacity < required {
            capacity = capacity.checked_mul(2).unwrap_or_else(|| capacity_overflow());
        }
        self.set_capacity(capacity);
    }

    pub fn push(&mut self, value: T) {
        self.reserve(1);
        unsafe { ptr::write(self.ptr().add(self.size), value) };
        self.size += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        self.size -= 1;
        Some(unsafe { ptr::read(self.ptr().add(self.size)) })
    }

    /// Drops every element, keeping the buffer.
    pub fn clear(&mut self) {
        let elems: *mut [T] = self.as_mut_slice();
        self.size = 0;
        unsafe { ptr::drop_in_place(elems) };
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr(), self.size) }
    }
}

impl<'a, T: Clone> Vec<'a, T> {
    pub fn extend_from_slice(&mut self, other: &[T]) {
        self.reserve(other.len());
        for value in other {
            self.push(value.clone());
        }
    }
}

impl<'a, T> Deref for Vec<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T> DerefMut for Vec<'a, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T> AsRef<[T]> for Vec<'a, T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T> AsMut<[T]> for Vec<'a, T> {
    fn as_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T> Extend<T> for Vec<'a, T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for value in iter {
            self.push(value);
        }
    }
}

impl<'v, 'a, T> IntoIterator for &'v Vec<'a, T> {
    type Item = &'v T;
    type IntoIter = slice::Iter<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'v, 'a, T> IntoIterator for &'v mut Vec<'a, T> {
    type Item = &'v mut T;
    type IntoIter = slice::IterMut<'v, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<'a, T: PartialEq> PartialEq for Vec<'a, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for Vec<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl<'a, T: serde::Serialize> serde::Serialize for Vec<'a, T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a, T> Drop for Vec<'a, T> {
    fn drop(&mut self) {
        unsafe { ptr::drop_in_place(self.as_mut_slice() as *mut [T]) };
        if let Err(err) = self.arena.free_chunk(self.buffer.map(|buffer| buffer.id())) {
            error!(%err, "vec buffer already released");
        }
    }
}
