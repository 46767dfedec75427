//! FNV-1a 32-bit hash.
//!
//! Routing decisions must be identical across processes and restarts, which
//! rules out `std::hash` (randomly seeded per process).

const FNV1A_32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV1A_32_PRIME: u32 = 0x0100_0193;

/// Hash `bytes` with 32-bit FNV-1a.
#[inline]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV1A_32_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV1A_32_PRIME);
    }
    hash
}
