//! BIP-37 bloom filters, used to subscribe to filtered blocks.

use crate::constants::BIP37_SEED;
use crate::error::{Error, Result};
use crate::hashing::murmur3;

/// A bloom filter with one byte per bit while under construction; the wire
/// form packs it via [`BloomFilter::bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Size of the packed bit field in bytes.
    pub size: u32,
    /// One byte per bit, each 0 or 1.
    pub bit_field: Vec<u8>,
    /// Number of hash functions applied per item.
    pub num_hashes: u32,
    /// Tweak mixed into every seed, to vary the filter when it saturates.
    pub tweak: u32,
}

impl BloomFilter {
    pub fn new(size: u32, num_hashes: u32, tweak: u32) -> Self {
        Self { size, bit_field: vec![0; (size * 8) as usize], num_hashes, tweak }
    }

    /// Sets the item's bits: murmur3 under the BIP-37 seed schedule
    /// `i * 0xfba4c795 + tweak`, reduced by the bit-field size.
    pub fn add(&mut self, item: &[u8]) {
        let bit_count = self.size * 8;
        for i in 0..self.num_hashes {
            let seed = i.wrapping_mul(BIP37_SEED).wrapping_add(self.tweak);
            let hash = murmur3(item, seed);
            self.bit_field[(hash % bit_count) as usize] = 1;
        }
    }

    /// The compact wire form: bits packed LSB-first into `size` bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        if self.bit_field.len() % 8 != 0 {
            return Err(Error::BadBitFieldLen);
        }
        let mut out = vec![0u8; self.bit_field.len() / 8];
        for (i, bit) in self.bit_field.iter().enumerate() {
            if *bit == 1 {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_vectors() {
        let mut filter = BloomFilter::new(10, 5, 99);
        filter.add(b"Hello World");
        assert_eq!(hex::encode(filter.bytes().unwrap()), "0000000a080000000140");

        filter.add(b"Goodbye!");
        assert_eq!(hex::encode(filter.bytes().unwrap()), "4000600a080000010940");
    }

    #[test]
    fn test_bytes_rejects_ragged_bit_field() {
        let mut filter = BloomFilter::new(1, 1, 0);
        filter.bit_field.push(1);
        assert!(matches!(filter.bytes(), Err(Error::BadBitFieldLen)));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut filter = BloomFilter::new(10, 5, 99);
        filter.add(b"Hello World");
        let once = filter.bytes().unwrap();
        filter.add(b"Hello World");
        assert_eq!(filter.bytes().unwrap(), once);
    }
}
