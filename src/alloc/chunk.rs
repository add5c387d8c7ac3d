use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every chunk payload.
pub const CHUNK_ALIGN: usize = 16;

/// Handle to an owned chunk handed out by [`Arena::alloc_chunk`].
///
/// The generation changes every time a slot is recycled, so a handle kept
/// around after [`Arena::free_chunk`] is recognised as stale instead of
/// silently aliasing whatever chunk took its place. A slot whose generation
/// would wrap is retired and never handed out again.
///
/// [`Arena::alloc_chunk`]: crate::Arena::alloc_chunk
/// [`Arena::free_chunk`]: crate::Arena::free_chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// One entry of the arena's chunk list.
///
/// `capacity == 0` marks an owned chunk whose size is `allocated`.
pub(crate) struct Chunk {
    pub(crate) prev: Option<u32>,
    pub(crate) next: Option<u32>,
    pub(crate) capacity: usize,
    pub(crate) allocated: usize,
    data: NonNull<u8>,
    block: usize,
}

#[cold]
#[inline(never)]
pub(crate) fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

fn payload_layout(size: usize) -> Layout {
    // Zero sized payloads still get a real block so the pointer is unique.
    Layout::from_size_align(size.max(1), CHUNK_ALIGN).unwrap_or_else(|_| capacity_overflow())
}

fn allocate(size: usize, zeroed: bool) -> (NonNull<u8>, usize) {
    let layout = payload_layout(size);
    let ptr = unsafe {
        if zeroed {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };
    match NonNull::new(ptr) {
        Some(ptr) => (ptr, layout.size()),
        None => alloc::handle_alloc_error(layout),
    }
}

impl Chunk {
    /// Bump chunks are zeroed up front so every byte handed out by
    /// `Arena::alloc` is initialized.
    pub(crate) fn bump(capacity: usize) -> Self {
        let (data, block) = allocate(capacity, true);
        Self {
            prev: None,
            next: None,
            capacity,
            allocated: 0,
            data,
            block,
        }
    }

    pub(crate) fn owned(size: usize, zeroed: bool) -> Self {
        let (data, block) = allocate(size, zeroed);
        Self {
            prev: None,
            next: None,
            capacity: 0,
            allocated: size,
            data,
            block,
        }
    }

    #[inline]
    pub(crate) fn is_owned(&self) -> bool {
        self.capacity == 0
    }

    #[inline]
    pub(crate) fn data(&self) -> NonNull<u8> {
        self.data
    }

    /// Bytes this chunk really occupies.
    #[inline]
    pub(crate) fn real_size(&self) -> usize {
        if self.is_owned() {
            self.allocated
        } else {
            self.capacity
        }
    }

    /// Bump chunk has room for `size` more bytes, keeping at least one byte
    /// of slack.
    #[inline]
    pub(crate) fn fits(&self, size: usize) -> bool {
        !self.is_owned()
            && self
                .allocated
                .checked_add(size)
                .map_or(false, |end| end < self.capacity)
    }

    /// Resizes an owned chunk's payload. The block may move; bytes past the
    /// old size are uninitialized.
    pub(crate) fn grow(&mut self, size: usize) {
        debug_assert!(self.is_owned());
        let old = payload_layout(self.block);
        let new = payload_layout(size);
        let ptr = unsafe { alloc::realloc(self.data.as_ptr(), old, new.size()) };
        self.data = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(new),
        };
        self.block = new.size();
        self.allocated = size;
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.data.as_ptr(), payload_layout(self.block)) }
    }
}

enum Slot {
    Occupied { generation: u32, chunk: Chunk },
    Vacant { generation: u32, next_free: Option<u32> },
    Retired,
}

/// Doubly linked list of chunks stored in a slab.
///
/// Links are slab indices, so a record never moves when its payload is
/// reallocated and neighbours never need patching for it. New chunks are
/// linked at the head.
#[derive(Default)]
pub(crate) struct ChunkList {
    slots: Vec<Slot>,
    begin: Option<u32>,
    free: Option<u32>,
    live: usize,
}

impl ChunkList {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn begin(&self) -> Option<u32> {
        self.begin
    }

    pub(crate) fn push_front(&mut self, mut chunk: Chunk) -> ChunkId {
        chunk.prev = None;
        chunk.next = self.begin;

        let id = match self.free {
            Some(index) => {
                let generation = match self.slots[index as usize] {
                    Slot::Vacant {
                        generation,
                        next_free,
                    } => {
                        self.free = next_free;
                        generation
                    }
                    Slot::Occupied { .. } | Slot::Retired => {
                        unreachable!("free list points at an unusable slot")
                    }
                };
                self.slots[index as usize] = Slot::Occupied { generation, chunk };
                ChunkId { index, generation }
            }
            None => {
                let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| capacity_overflow());
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    chunk,
                });
                ChunkId {
                    index,
                    generation: 0,
                }
            }
        };

        if let Some(old_head) = self.begin {
            self.chunk_at_mut(old_head).prev = Some(id.index);
        }
        self.begin = Some(id.index);
        self.live += 1;
        id
    }

    pub(crate) fn get(&self, id: ChunkId) -> Option<&Chunk> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, chunk } if *generation == id.generation => Some(chunk),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, chunk } if *generation == id.generation => Some(chunk),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn id_at(&self, index: u32) -> ChunkId {
        match &self.slots[index as usize] {
            Slot::Occupied { generation, .. } => ChunkId {
                index,
                generation: *generation,
            },
            Slot::Vacant { .. } | Slot::Retired => {
                unreachable!("chunk list links to a vacant slot")
            }
        }
    }

    pub(crate) fn chunk_at(&self, index: u32) -> &Chunk {
        match &self.slots[index as usize] {
            Slot::Occupied { chunk, .. } => chunk,
            Slot::Vacant { .. } | Slot::Retired => {
                unreachable!("chunk list links to a vacant slot")
            }
        }
    }

    pub(crate) fn chunk_at_mut(&mut self, index: u32) -> &mut Chunk {
        match &mut self.slots[index as usize] {
            Slot::Occupied { chunk, .. } => chunk,
            Slot::Vacant { .. } | Slot::Retired => {
                unreachable!("chunk list links to a vacant slot")
            }
        }
    }

    /// State of a slot once the chunk of `generation` has left it. The slot
    /// joins the free list unless its generation is used up.
    fn vacate(&mut self, index: u32, generation: u32) -> Slot {
        match generation.checked_add(1) {
            Some(generation) => {
                let slot = Slot::Vacant {
                    generation,
                    next_free: self.free,
                };
                self.free = Some(index);
                slot
            }
            None => Slot::Retired,
        }
    }

    /// Unlinks the chunk and retires its slot. The returned chunk releases
    /// its payload when dropped.
    pub(crate) fn remove(&mut self, id: ChunkId) -> Option<Chunk> {
        let (prev, next) = {
            let chunk = self.get(id)?;
            (chunk.prev, chunk.next)
        };

        if self.begin == Some(id.index) {
            self.begin = next;
        }
        if let Some(prev) = prev {
            self.chunk_at_mut(prev).next = next;
        }
        if let Some(next) = next {
            self.chunk_at_mut(next).prev = prev;
        }

        let vacant = self.vacate(id.index, id.generation);
        self.live -= 1;

        match std::mem::replace(&mut self.slots[id.index as usize], vacant) {
            Slot::Occupied { chunk, .. } => Some(chunk),
            Slot::Vacant { .. } | Slot::Retired => unreachable!("validated chunk slot was vacant"),
        }
    }

    /// Walks the list from the head.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.begin,
        }
    }

    /// Visits every chunk in list order.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut Chunk)) {
        let mut cursor = self.begin;
        while let Some(index) = cursor {
            let chunk = self.chunk_at_mut(index);
            f(chunk);
            cursor = chunk.next;
        }
    }

    /// Drops every chunk. Slots keep their generations, so every handle
    /// issued so far goes stale.
    pub(crate) fn clear(&mut self) {
        for index in 0..self.slots.len() {
            let generation = match &self.slots[index] {
                Slot::Occupied { generation, .. } => *generation,
                Slot::Vacant { .. } | Slot::Retired => continue,
            };
            let vacant = self.vacate(index as u32, generation);
            self.slots[index] = vacant;
        }
        self.begin = None;
        self.live = 0;
    }
}

pub(crate) struct Iter<'a> {
    list: &'a ChunkList,
    cursor: Option<u32>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (u32, &'a Chunk);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let chunk = self.list.chunk_at(index);
        self.cursor = chunk.next;
        Some((index, chunk))
    }
}
