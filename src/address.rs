//! Base58Check encodings at the crate boundary: P2PKH addresses and WIF
//! private keys.

use crate::ecdsa::{PrivateKey, PublicKey};
use crate::error::{Error, Result};
use crate::hashing::{hash160, hash256};
use crate::types::Hash160;
use num_bigint::BigUint;
use num_traits::Zero;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encodes bytes in base58, preserving leading zero bytes as '1's.
pub fn base58_encode(data: &[u8]) -> String {
    let fifty_eight = BigUint::from(58u32);
    let mut n = BigUint::from_bytes_be(data);
    let mut chars = Vec::new();
    while !n.is_zero() {
        let rem = (&n % &fifty_eight).to_u32_digits();
        let digit = rem.first().copied().unwrap_or(0) as usize;
        chars.push(ALPHABET[digit]);
        n /= &fifty_eight;
    }
    for byte in data {
        if *byte != 0 {
            break;
        }
        chars.push(ALPHABET[0]);
    }
    chars.reverse();
    String::from_utf8(chars).expect("alphabet is ascii")
}

/// Decodes base58, restoring leading '1' characters as zero bytes.
pub fn base58_decode(s: &str) -> Result<Vec<u8>> {
    let fifty_eight = BigUint::from(58u32);
    let mut n = BigUint::zero();
    for c in s.bytes() {
        let digit = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(Error::ChecksumMismatch)?;
        n = n * &fifty_eight + BigUint::from(digit);
    }
    let mut out = n.to_bytes_be();
    if out == [0] {
        out.clear();
    }
    let leading_ones = s.bytes().take_while(|&c| c == b'1').count();
    let mut result = vec![0u8; leading_ones];
    result.append(&mut out);
    Ok(result)
}

fn base58_check(payload: &[u8]) -> String {
    let checksum = hash256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    base58_encode(&data)
}

/// The Base58Check P2PKH address for a public key.
///
/// Version byte 0x00 on mainnet, 0x6f on testnet.
pub fn address(public_key: &PublicKey, compressed: bool, testnet: bool) -> String {
    let h160 = if compressed {
        hash160(&public_key.sec_compressed())
    } else {
        hash160(&public_key.sec())
    };
    let mut payload = Vec::with_capacity(21);
    payload.push(if testnet { 0x6f } else { 0x00 });
    payload.extend_from_slice(&h160);
    base58_check(&payload)
}

/// Recovers the 20-byte public-key hash from a Base58Check address,
/// validating the checksum.
pub fn address_to_pubkey_hash(address: &str) -> Result<Hash160> {
    let data = base58_decode(address)?;
    if data.len() != 25 {
        return Err(Error::ChecksumMismatch);
    }
    let (payload, checksum) = data.split_at(21);
    if hash256(payload)[..4] != *checksum {
        return Err(Error::ChecksumMismatch);
    }
    let mut h160 = [0u8; 20];
    h160.copy_from_slice(&payload[1..]);
    Ok(h160)
}

/// Encodes a private key in wallet import format.
///
/// Layout: net id (0x80 mainnet, 0xef testnet), the 32-byte big-endian
/// secret, an optional 0x01 marker for compressed public keys, and the
/// 4-byte Base58Check checksum.
pub fn wif(private_key: &PrivateKey, compressed: bool, testnet: bool) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(if testnet { 0xef } else { 0x80 });
    payload.extend_from_slice(&private_key.secret_bytes());
    if compressed {
        payload.push(0x01);
    }
    base58_check(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_round_trip() {
        for data in [&b"hello"[..], &[0x00, 0x00, 0xab, 0xcd], &[], &[0x00]] {
            assert_eq!(base58_decode(&base58_encode(data)).unwrap(), data.to_vec());
        }
    }

    #[test]
    fn test_testnet_address_vector() {
        let private_key = PrivateKey::from_passphrase("vivelev@icloud.comiamfrombetelgeuse");
        let addr = address(&private_key.public_key, true, true);
        assert_eq!(addr, "n263UYMwVbYceYhUVsbo3vGxViSNvEP74z");
    }

    #[test]
    fn test_address_round_trips_to_pubkey_hash() {
        let private_key = PrivateKey::from_passphrase("round trip");
        let h160 = hash160(&private_key.public_key.sec_compressed());
        let addr = address(&private_key.public_key, true, false);
        assert_eq!(address_to_pubkey_hash(&addr).unwrap(), h160);
    }

    #[test]
    fn test_address_checksum_detects_typos() {
        let mut addr = String::from("n263UYMwVbYceYhUVsbo3vGxViSNvEP74z");
        addr.replace_range(10..11, "4");
        assert!(address_to_pubkey_hash(&addr).is_err());
    }

    #[test]
    fn test_wif_known_vector() {
        // secret 1 on mainnet, uncompressed: a classic WIF reference value
        let private_key = PrivateKey::from_secret(num_bigint::BigUint::from(1u32)).unwrap();
        assert_eq!(
            wif(&private_key, false, false),
            "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf"
        );
    }
}
