//! Hash functions for the sieve engine
//!
//! Murmur3 32-bit keys the token index, CRC32 guards selfie blobs and
//! xxHash64 fingerprints compiled lines for duplicate elimination.
//!
//! # Sentinel Handling
//!
//! Token hash 0 is reserved, `hash_token` never returns it.

use std::hash::Hasher;

use twox_hash::XxHash64;

/// Longest token prefix that takes part in hashing. Both the compiler and
/// the URL scan truncate to this length, so truncation only adds candidates.
pub const MAX_TOKEN_LENGTH: usize = 7;

const TOKEN_SEED: u32 = 0x811c9dc5;

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical token lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2;
    while i < chunks {
        let k = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);

        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);

        i += 4;
    }

    // Process remaining bytes
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        let k = k.wrapping_mul(0xcc9e2d51);
        let k = k.rotate_left(15);
        let k = k.wrapping_mul(0x1b873593);
        h ^= k;
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

/// Compute the index key of a token fragment.
///
/// The fragment is lowercased and truncated to `MAX_TOKEN_LENGTH` bytes.
/// Ensures result is never 0 (sentinel value).
#[inline]
pub fn hash_token(fragment: &[u8]) -> u32 {
    let len = fragment.len().min(MAX_TOKEN_LENGTH);
    let mut buf = [0u8; MAX_TOKEN_LENGTH];
    for (dst, &b) in buf.iter_mut().zip(&fragment[..len]) {
        *dst = b.to_ascii_lowercase();
    }
    let mut h = murmur3_32(&buf[..len], TOKEN_SEED);
    if h == 0 {
        h = 1;
    }
    h
}

/// 64-bit fingerprint of a compiled line, used by the duplicate buster.
#[inline]
pub fn fingerprint(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

/// Compute CRC32 for selfie integrity checking.
/// Uses the standard CRC32 polynomial (IEEE 802.3).
pub fn crc32(data: &[u8]) -> u32 {
    static CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 { 0xedb88320 ^ (c >> 1) } else { c >> 1 };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    let mut crc = 0xffffffff_u32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    crc ^ 0xffffffff
}
