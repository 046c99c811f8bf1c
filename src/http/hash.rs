//! 32-bit FNV-1a hashes used to pre-filter header names and directory
//! names before the exact string compare.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Case-sensitive hash.
pub fn simple_hash(s: &str) -> u32 {
    s.bytes().fold(FNV_OFFSET, |h, b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// Case-insensitive hash: ASCII letters are folded to lower case first.
pub fn simple_uhash(s: &str) -> u32 {
    s.bytes().fold(FNV_OFFSET, |h, b| {
        (h ^ u32::from(b.to_ascii_lowercase())).wrapping_mul(FNV_PRIME)
    })
}
