//! Chunked region allocator.
//!
//! An [`Arena`] keeps a list of chunks and offers two disciplines over it:
//!
//! - bump allocation ([`Arena::alloc`], [`Arena::calloc`]): many small
//!   allocations packed into shared chunks, released only in bulk by
//!   [`Arena::reset`] or [`Arena::free`];
//! - owned chunks ([`Arena::alloc_chunk`] and friends): one allocation per
//!   chunk that can be grown or freed on its own. Growable buffers such as
//!   table backing arrays live here.

mod chunk;

pub use chunk::{ChunkId, CHUNK_ALIGN};
pub(crate) use chunk::capacity_overflow;

use chunk::{Chunk, ChunkList};
use derivative::Derivative;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;
use tracing::trace;

use crate::ArenaError;

/// Default size of a bump chunk, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4000;

const WORD: usize = mem::size_of::<usize>();

/// Rounds `size` up to pointer width.
///
/// Panics with "capacity overflow" when the rounded size does not fit in
/// `usize`.
#[inline]
pub fn align_up(size: usize) -> usize {
    match size.checked_add(WORD - 1) {
        Some(end) => end & !(WORD - 1),
        None => capacity_overflow(),
    }
}

/// An owned chunk: its handle plus the current payload address.
///
/// The address stays valid until the chunk is reallocated or freed, or the
/// arena itself is freed. [`Arena::reset`] leaves owned chunks alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChunk {
    id: ChunkId,
    ptr: NonNull<u8>,
    len: usize,
}

impl RawChunk {
    fn new(id: ChunkId, chunk: &Chunk) -> Self {
        Self {
            id,
            ptr: chunk.data(),
            len: chunk.allocated,
        }
    }

    #[inline]
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Payload address, aligned to [`CHUNK_ALIGN`].
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Payload size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Snapshot of one chunk, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Bump capacity; zero for owned chunks.
    pub capacity: usize,
    /// Bump offset, or the payload size of an owned chunk.
    pub allocated: usize,
    pub owned: bool,
}

impl From<&Chunk> for ChunkInfo {
    fn from(chunk: &Chunk) -> Self {
        Self {
            capacity: chunk.capacity,
            allocated: chunk.allocated,
            owned: chunk.is_owned(),
        }
    }
}

fn fmt_chunks(chunks: &RefCell<ChunkList>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match chunks.try_borrow() {
        Ok(chunks) => f
            .debug_list()
            .entries(chunks.iter().map(|(_, chunk)| ChunkInfo::from(chunk)))
            .finish(),
        Err(_) => f.write_str("<borrowed>"),
    }
}

/// Region allocator over a doubly linked list of chunks.
///
/// Allocation goes through `&self` so containers can share one arena;
/// [`reset`](Arena::reset) and [`free`](Arena::free) need `&mut self`,
/// which guarantees no bump allocation is still borrowed when its memory is
/// recycled.
///
/// Not thread-safe: callers synchronize.
#[derive(Derivative)]
#[derivative(Debug, Default)]
pub struct Arena {
    #[derivative(Debug(format_with = "fmt_chunks"))]
    chunks: RefCell<ChunkList>,
    #[derivative(Default(value = "DEFAULT_CHUNK_SIZE"))]
    chunk_size: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena whose bump chunks hold at least `chunk_size` bytes.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: RefCell::default(),
            chunk_size: chunk_size.max(WORD),
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bump allocates `size` bytes aligned to pointer width.
    ///
    /// The bytes may hold data from before the last [`reset`](Arena::reset);
    /// use [`calloc`](Arena::calloc) for zeroed memory.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc(&self, size: usize) -> &mut [u8] {
        let aligned = align_up(size);
        let mut chunks = self.chunks.borrow_mut();

        let found = chunks
            .iter()
            .find(|(_, chunk)| chunk.fits(aligned))
            .map(|(index, _)| index);
        let index = match found {
            Some(index) => index,
            None => {
                let capacity = aligned.max(self.chunk_size);
                trace!(capacity, "new bump chunk");
                chunks.push_front(Chunk::bump(capacity)).index
            }
        };

        let chunk = chunks.chunk_at_mut(index);
        let ptr = unsafe { chunk.data().as_ptr().add(chunk.allocated) };
        chunk.allocated += aligned;
        drop(chunks);

        // Bump chunks are never moved or released through `&self`, and their
        // payload is initialized at creation.
        unsafe { slice::from_raw_parts_mut(ptr, size) }
    }

    /// Like [`alloc`](Arena::alloc), zero filled.
    #[allow(clippy::mut_from_ref)]
    pub fn calloc(&self, size: usize) -> &mut [u8] {
        let bytes = self.alloc(size);
        bytes.fill(0);
        bytes
    }

    /// Moves `value` into the arena. It is never dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T>(&self, value: T) -> &mut T {
        self.alloc_with(|| value)
    }

    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_with<F, T>(&self, f: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        #[inline(always)]
        unsafe fn inner_writer<T, F>(ptr: *mut T, f: F)
        where
            F: FnOnce() -> T,
        {
            // Kept out of line from the caller so LLVM writes f()'s result
            // straight into the arena instead of staging it on the stack.
            std::ptr::write(ptr, f())
        }

        assert!(
            mem::align_of::<T>() <= WORD,
            "bump allocations are only aligned to pointer width"
        );

        let ptr = self.alloc(mem::size_of::<T>()).as_mut_ptr().cast::<T>();
        unsafe {
            inner_writer(ptr, f);
            &mut *ptr
        }
    }

    /// Copies `src` into the arena.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        assert!(
            mem::align_of::<T>() <= WORD,
            "bump allocations are only aligned to pointer width"
        );

        let ptr = self.alloc(mem::size_of_val(src)).as_mut_ptr().cast::<T>();
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len());
            slice::from_raw_parts_mut(ptr, src.len())
        }
    }

    /// Creates a dedicated chunk of exactly `size` bytes. The payload is
    /// uninitialized.
    pub fn alloc_chunk(&self, size: usize) -> RawChunk {
        self.push_owned(size, false)
    }

    /// Like [`alloc_chunk`](Arena::alloc_chunk), zero filled.
    pub fn calloc_chunk(&self, size: usize) -> RawChunk {
        self.push_owned(size, true)
    }

    fn push_owned(&self, size: usize, zeroed: bool) -> RawChunk {
        let mut chunks = self.chunks.borrow_mut();
        let id = chunks.push_front(Chunk::owned(size, zeroed));
        trace!(?id, size, "new owned chunk");
        RawChunk::new(id, chunks.chunk_at(id.index))
    }

    /// Current address and size of an owned chunk.
    pub fn chunk(&self, id: ChunkId) -> Result<RawChunk, ArenaError> {
        let chunks = self.chunks.borrow();
        let chunk = chunks
            .get(id)
            .filter(|chunk| chunk.is_owned())
            .ok_or(ArenaError::StaleChunk { id })?;
        Ok(RawChunk::new(id, chunk))
    }

    /// Grows an owned chunk to `size` bytes, or creates one when `id` is
    /// `None`.
    ///
    /// Asking for less than the current size returns the chunk unchanged.
    /// Growing may move the payload: addresses from earlier [`RawChunk`]s are
    /// invalid afterwards, the handle stays the same. Bytes past the old
    /// size are uninitialized.
    pub fn realloc_chunk(&self, id: Option<ChunkId>, size: usize) -> Result<RawChunk, ArenaError> {
        let id = match id {
            Some(id) => id,
            None => return Ok(self.alloc_chunk(size)),
        };

        let mut chunks = self.chunks.borrow_mut();
        let chunk = chunks
            .get_mut(id)
            .filter(|chunk| chunk.is_owned())
            .ok_or(ArenaError::StaleChunk { id })?;
        if size > chunk.allocated {
            trace!(?id, from = chunk.allocated, to = size, "grow owned chunk");
            chunk.grow(size);
        }
        Ok(RawChunk::new(id, chunk))
    }

    /// Unlinks an owned chunk and releases its memory. `None` is a no-op.
    pub fn free_chunk(&self, id: Option<ChunkId>) -> Result<(), ArenaError> {
        let id = match id {
            Some(id) => id,
            None => return Ok(()),
        };

        let mut chunks = self.chunks.borrow_mut();
        if !chunks.get(id).map_or(false, Chunk::is_owned) {
            return Err(ArenaError::StaleChunk { id });
        }
        let chunk = chunks.remove(id).ok_or(ArenaError::StaleChunk { id })?;
        drop(chunks);
        trace!(?id, size = chunk.allocated, "free owned chunk");
        drop(chunk);
        Ok(())
    }

    /// Rewinds every bump chunk to offset zero, keeping its memory.
    /// Owned chunks are untouched.
    pub fn reset(&mut self) {
        self.chunks.get_mut().for_each_mut(|chunk| {
            if !chunk.is_owned() {
                chunk.allocated = 0;
            }
        });
    }

    /// Releases every chunk, owned ones included.
    pub fn free(&mut self) {
        let chunks = self.chunks.get_mut();
        trace!(chunks = chunks.len(), "free arena");
        chunks.clear();
    }

    /// Bytes in use across all chunks.
    pub fn size(&self) -> usize {
        self.chunks
            .borrow()
            .iter()
            .map(|(_, chunk)| chunk.allocated)
            .sum()
    }

    /// Bytes reserved across all chunks.
    pub fn real_size(&self) -> usize {
        self.chunks
            .borrow()
            .iter()
            .map(|(_, chunk)| chunk.real_size())
            .sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.borrow().len()
    }

    /// Chunks in list order, head first.
    pub fn chunks(&self) -> std::vec::Vec<ChunkInfo> {
        self.chunks
            .borrow()
            .iter()
            .map(|(_, chunk)| ChunkInfo::from(chunk))
            .collect()
    }

    /// Handle of the chunk at the head of the list, if it is owned.
    ///
    /// Containers' handles must never reach callers, who could free the
    /// storage out from under them, so this stays inside the crate's tests.
    #[cfg(test)]
    pub(crate) fn head_chunk(&self) -> Option<ChunkId> {
        let chunks = self.chunks.borrow();
        let index = chunks.begin()?;
        if chunks.chunk_at(index).is_owned() {
            Some(chunks.id_at(index))
        } else {
            None
        }
    }
}
