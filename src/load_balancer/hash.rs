//! Stateless hash-based upstream selection.
//!
//! Every request (or connection) is mapped to `candidates[fnv1a_32(key) % len]`.
//! This is plain modulo hashing, not a consistent-hash ring: changing the
//! number of candidates moves most keys to a different upstream.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Index of the candidate selected for `key`, or `None` when there are none.
pub fn select_index(key: &[u8], len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(fnv1a_32(key) as usize % len)
}

/// Candidate selected for `key`.
pub fn select<'a, T>(key: &[u8], candidates: &'a [T]) -> Option<&'a T> {
    select_index(key, candidates.len()).map(|i| &candidates[i])
}
