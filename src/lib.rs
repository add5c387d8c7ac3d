//! Arena allocation plus hash containers that keep their storage in it.
//!
//! ```
//! use chunkmap::{hash::hash_str, Arena, HashMap};
//!
//! let arena = Arena::new();
//! let mut ages = HashMap::new_in(&arena);
//! ages.insert(hash_str("ada"), 36u32);
//! ages.insert(hash_str("alan"), 41);
//!
//! assert_eq!(ages.get(hash_str("ada")), Some(&36));
//! assert_eq!(ages.remove(hash_str("alan")), Some(41));
//! assert_eq!(ages.len(), 1);
//! ```
//!
//! Keys are caller supplied 64-bit hashes; the containers never see the
//! original key. See [`hash`] for helpers that produce them.

pub mod alloc;
pub mod collections;
mod error;
pub mod hash;

pub use alloc::{Arena, ChunkId, ChunkInfo, RawChunk, CHUNK_ALIGN, DEFAULT_CHUNK_SIZE};
pub use collections::{HashMap, HashSet, Vec};
pub use error::ArenaError;
