use thiserror::Error;

use crate::alloc::ChunkId;

/// Errors reported by the [`Arena`](crate::Arena) chunk API.
///
/// Running out of memory is not represented here: a failed system
/// allocation aborts the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    /// The handle refers to a chunk that was already freed, or to a slot
    /// that has since been reused by another chunk.
    #[error("chunk {id:?} is stale: it was freed or never belonged to this arena")]
    StaleChunk {
        /// The offending handle.
        id: ChunkId,
    },
}
