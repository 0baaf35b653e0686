//! Block headers: the 80-byte wire format, proof-of-work target
//! arithmetic, and header-chain validation.

use crate::constants::{MAINNET_GENESIS_HEADER, TESTNET_GENESIS_HEADER};
use crate::encoding::{read_array, read_u32_le};
use crate::error::{Error, Result};
use crate::hashing::hash256;
use crate::types::{reverse, reverse_hash, Hash256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

/// A Bitcoin block header.
///
/// `prev_block` and `merkle_root` are kept in display (big-endian) order
/// and byte-reversed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: [u8; 4],
    pub nonce: [u8; 4],
}

impl BlockHeader {
    /// The 80-byte wire serialization.
    pub fn serialize(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&reverse(&self.prev_block));
        out[36..68].copy_from_slice(&reverse(&self.merkle_root));
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits);
        out[76..].copy_from_slice(&self.nonce);
        out
    }

    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let version = read_u32_le(r)?;
        let prev_block = reverse_hash(&read_array::<32, _>(r)?);
        let merkle_root = reverse_hash(&read_array::<32, _>(r)?);
        let timestamp = read_u32_le(r)?;
        let bits = read_array::<4, _>(r)?;
        let nonce = read_array::<4, _>(r)?;
        Ok(Self { version, prev_block, merkle_root, timestamp, bits, nonce })
    }

    /// The header hash in display order.
    pub fn hash(&self) -> Hash256 {
        reverse_hash(&hash256(&self.serialize()))
    }

    /// Block id: the header hash as lowercase hex.
    pub fn id(&self) -> String {
        hex::encode(self.hash())
    }

    /// Expands the compact `bits` field into the proof-of-work target:
    /// `coefficient * 256^(exponent - 3)`.
    pub fn target(&self) -> BigUint {
        let exponent = u32::from(self.bits[3]);
        let coefficient =
            u32::from_le_bytes([self.bits[0], self.bits[1], self.bits[2], 0x00]);
        BigUint::from(coefficient) * BigUint::from(256u32).pow(exponent.saturating_sub(3))
    }

    /// Mining difficulty normalized so the genesis block's is 1:
    /// `0xffff * 256^(0x1d - 3) / target`.
    pub fn difficulty(&self) -> BigUint {
        let lowest = BigUint::from(0xffffu32) * BigUint::from(256u32).pow(0x1d - 3);
        lowest / self.target()
    }

    /// Whether the header hash, read as a little-endian 256-bit integer,
    /// is below the target.
    pub fn verify_pow(&self) -> bool {
        let proof = BigUint::from_bytes_le(&hash256(&self.serialize()));
        proof < self.target()
    }

    /// The well-known genesis header for the selected network.
    pub fn genesis(testnet: bool) -> Self {
        let raw = hex::decode(if testnet { TESTNET_GENESIS_HEADER } else { MAINNET_GENESIS_HEADER })
            .expect("genesis constants are valid hex");
        Self::parse(&mut Cursor::new(&raw)).expect("genesis constants are valid headers")
    }
}

/// Validates a contiguous run of headers: each must satisfy its
/// proof-of-work and link to the id of its predecessor.
pub fn validate_header_chain(headers: &[BlockHeader]) -> Result<()> {
    for (i, header) in headers.iter().enumerate() {
        if !header.verify_pow() {
            return Err(Error::BadPow);
        }
        if i > 0 && header.prev_block != headers[i - 1].hash() {
            return Err(Error::BrokenChain);
        }
    }
    Ok(())
}
