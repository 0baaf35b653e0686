//! Hash primitives: SHA-256, RIPEMD-160, the Bitcoin double-hash forms,
//! and MurmurHash3-32 for BIP-37 bloom filters.

use crate::types::{Hash160, Hash256};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single round of SHA-256.
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Single round of RIPEMD-160.
pub fn ripemd160(data: &[u8]) -> Hash160 {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(data));
    out
}

/// Two rounds of SHA-256, as used for txids, block ids and checksums.
pub fn hash256(data: &[u8]) -> Hash256 {
    sha256(&sha256(data))
}

/// SHA-256 followed by RIPEMD-160, as used for addresses.
pub fn hash160(data: &[u8]) -> Hash160 {
    ripemd160(&sha256(data))
}

fn murmur_scramble(mut k: u32) -> u32 {
    k = k.wrapping_mul(0xcc9e2d51);
    k = k.rotate_left(15);
    k.wrapping_mul(0x1b873593)
}

/// MurmurHash3, 32-bit little-endian variant.
///
/// This is the exact function BIP-37 specifies for bloom filters; the body
/// mixes 4-byte little-endian chunks, the tail the remaining 1-3 bytes.
pub fn murmur3(key: &[u8], seed: u32) -> u32 {
    let mut hash = seed;
    let nbytes = key.len() as u32;

    let mut chunks = key.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        hash ^= murmur_scramble(k);
        hash = hash.rotate_left(13);
        hash = hash.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for &byte in tail.iter().rev() {
            k <<= 8;
            k |= byte as u32;
        }
        hash ^= murmur_scramble(k);
    }

    hash ^= nbytes;
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85ebca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2ae35);
    hash ^= hash >> 16;
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_is_double_sha256() {
        let data = b"Hello World";
        assert_eq!(hash256(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_hash160_is_ripemd_of_sha256() {
        let data = b"Hello World";
        assert_eq!(hash160(data), ripemd160(&sha256(data)));
    }

    #[test]
    fn test_sha256_vector() {
        // sha256("abc"), FIPS 180-2 appendix B.1
        let want = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(hex::encode(sha256(b"abc")), want);
    }

    #[test]
    fn test_murmur3_empty_key() {
        // murmur3 of the empty string with seed 0
        assert_eq!(murmur3(b"", 0), 0);
    }

    #[test]
    fn test_murmur3_reference_values() {
        // Public test vectors for the 32-bit little-endian variant.
        assert_eq!(murmur3(b"", 1), 0x514e28b7);
        assert_eq!(murmur3(b"test", 0), 0xba6bd213);
        assert_eq!(murmur3(b"The quick brown fox jumps over the lazy dog", 0x9747b28c), 0x2fa826cd);
    }

    #[test]
    fn test_murmur3_tail_lengths() {
        // differing tail lengths must hash differently
        let a = murmur3(b"a", 7);
        let b = murmur3(b"ab", 7);
        let c = murmur3(b"abc", 7);
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
