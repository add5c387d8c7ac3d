//! Hashing and sizing helpers shared by the tables.

use crate::alloc::capacity_overflow;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Integer mixing hash.
///
/// Tables use it to move keys that collide with their slot sentinels
/// somewhere else; it is also a reasonable way to spread small integers.
#[inline]
pub const fn u64_hash(value: u64) -> u64 {
    let mut hash = value.wrapping_add(1);
    hash = (((hash >> 16) ^ hash) % 0x3A_A387_A8B1).wrapping_mul(0x45d_9f3b);
    hash = (((hash >> 16) ^ hash) % 0x3A_A387_A8B1).wrapping_mul(0x45d_9f3b);
    (hash >> 16) ^ hash
}

/// Smallest power of two `>= n`; `next_pow2(0) == 1`.
///
/// Panics when the result does not fit in `usize`.
#[inline]
pub fn next_pow2(n: usize) -> usize {
    n.checked_next_power_of_two()
        .unwrap_or_else(|| capacity_overflow())
}

/// 64-bit FNV-1a over `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[inline]
pub fn hash_str(s: &str) -> u64 {
    hash_bytes(s.as_bytes())
}
