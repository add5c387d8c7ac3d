//! Containers whose storage lives in an [`Arena`](crate::Arena).

use tracing::error;

use crate::ArenaError;

pub mod hash_map;
pub mod hash_set;
mod raw_table;
pub mod vec;

pub use hash_map::HashMap;
pub use hash_set::HashSet;
pub use raw_table::{DEFAULT_SIZE, TOMBSTONE};
pub use vec::Vec;

/// A container lost track of its own backing chunk.
#[cold]
#[inline(never)]
pub(crate) fn lost_chunk(err: ArenaError) -> ! {
    error!(%err, "container backing chunk is gone");
    panic!("container backing chunk is gone: {}", err);
}
