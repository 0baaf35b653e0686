//! ECDSA over secp256k1 with deterministic nonces.
//!
//! Nonce derivation follows the RFC-6979 HMAC-SHA256 construction, and
//! emitted signatures are canonicalized to low-s form.

use crate::curve::{self, AffinePoint, CurveParams, SECP256K1};
use crate::error::{Error, Result};
use crate::hashing::hash256;
use crate::types::Hash256;
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Deterministic nonce generator (RFC-6979 shape).
///
/// `next_k` yields successive candidates in [1, n-1]; pulling another
/// candidate advances the HMAC state, so the r=0/s=0 restarts of the
/// signing loop never see the same nonce twice.
struct NonceGenerator<'a> {
    k: [u8; 32],
    v: [u8; 32],
    n: &'a BigUint,
}

impl<'a> NonceGenerator<'a> {
    fn new(curve: &'a CurveParams, d: &BigUint, z: &BigUint) -> Self {
        let secret_bytes = curve::be_bytes_32(d);
        let z_bytes = curve::be_bytes_32(z);

        let mut k = [0x00u8; 32];
        let mut v = [0x01u8; 32];
        k = hmac_sha256(&k, &[&v, &[0x00], &secret_bytes, &z_bytes]);
        v = hmac_sha256(&k, &[&v]);
        k = hmac_sha256(&k, &[&v, &[0x01], &secret_bytes, &z_bytes]);
        v = hmac_sha256(&k, &[&v]);

        Self { k, v, n: &curve.n }
    }

    fn next_k(&mut self) -> BigUint {
        loop {
            self.v = hmac_sha256(&self.k, &[&self.v]);
            let candidate = BigUint::from_bytes_be(&self.v);
            if !candidate.is_zero() && candidate < *self.n {
                return candidate;
            }
            self.k = hmac_sha256(&self.k, &[&self.v, &[0x00]]);
            self.v = hmac_sha256(&self.k, &[&self.v]);
        }
    }
}

/// Reduces a 32-byte message digest into the scalar field, subtracting n
/// once if needed.
fn reduce_digest(curve: &CurveParams, z: &Hash256) -> BigUint {
    let mut z_int = BigUint::from_bytes_be(z);
    if z_int >= curve.n {
        z_int -= &curve.n;
    }
    z_int
}

/// An ECDSA public key: a point on secp256k1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub point: AffinePoint,
}

impl PublicKey {
    /// Parses a SEC1-encoded point (compressed or uncompressed).
    pub fn from_sec(data: &[u8]) -> Result<Self> {
        let point = curve::unmarshal(&SECP256K1, data)?;
        Ok(Self { point })
    }

    /// SEC1 uncompressed form, 65 bytes.
    pub fn sec(&self) -> [u8; 65] {
        curve::marshal(&self.point)
    }

    /// SEC1 compressed form, 33 bytes.
    pub fn sec_compressed(&self) -> [u8; 33] {
        curve::marshal_compressed(&self.point)
    }

    /// Verifies a signature against a 32-byte message digest.
    pub fn verify(&self, z: &Hash256, signature: &Signature) -> bool {
        let curve = &*SECP256K1;
        let one = BigUint::one();
        if signature.r < one || signature.r >= curve.n || signature.s < one || signature.s >= curve.n
        {
            return false;
        }

        let z_int = reduce_digest(curve, z);
        let w = signature.s.modpow(&(&curve.n - 2u32), &curve.n);
        let u1 = (&z_int * &w) % &curve.n;
        let u2 = (&signature.r * &w) % &curve.n;
        let q = curve.add(
            &curve.scalar_base_mult(&u1),
            &curve.scalar_mult(&self.point, &u2),
        );
        if q.is_infinity() {
            return false;
        }
        q.x % &curve.n == signature.r
    }
}

/// An ECDSA private key bundling its public key.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    d: BigUint,
    pub public_key: PublicKey,
}

impl PrivateKey {
    /// Derives a key pair from a passphrase: d = hash256(passphrase) mod n.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let curve = &*SECP256K1;
        let digest = hash256(passphrase.as_bytes());
        let d = BigUint::from_bytes_be(&digest) % &curve.n;
        Self::from_secret(d).expect("reduced scalar is in range")
    }

    /// Wraps an existing secret scalar, rejecting values outside [1, n-1].
    pub fn from_secret(d: BigUint) -> Result<Self> {
        let curve = &*SECP256K1;
        if d.is_zero() || d >= curve.n {
            return Err(Error::InvalidScalar);
        }
        let point = curve.scalar_base_mult(&d);
        Ok(Self { d, public_key: PublicKey { point } })
    }

    /// The secret scalar, left-padded to 32 big-endian bytes (WIF form).
    pub fn secret_bytes(&self) -> [u8; 32] {
        curve::be_bytes_32(&self.d)
    }

    /// Signs a 32-byte message digest, returning a low-s signature.
    pub fn sign(&self, z: &Hash256) -> Signature {
        let curve = &*SECP256K1;
        let z_int = reduce_digest(curve, z);
        let half_n = &curve.n >> 1;
        let mut nonces = NonceGenerator::new(curve, &self.d, &z_int);

        loop {
            let k = nonces.next_k();
            let r = curve.scalar_base_mult(&k).x % &curve.n;
            if r.is_zero() {
                continue;
            }
            let k_inv = k.modpow(&(&curve.n - 2u32), &curve.n);
            let s = ((&z_int + &r * &self.d) * k_inv) % &curve.n;
            if s.is_zero() {
                continue;
            }
            let s = if s > half_n { &curve.n - s } else { s };
            return Signature { r, s };
        }
    }
}

/// An ECDSA signature pair (r, s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub r: BigUint,
    pub s: BigUint,
}

/// Minimal big-endian integer encoding for DER: leading zeros stripped,
/// one 0x00 prepended when the top bit is set.
fn der_integer(n: &BigUint) -> Vec<u8> {
    let mut bytes = n.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    bytes
}

impl Signature {
    /// DER serialization: 0x30 L 0x02 Lr r 0x02 Ls s.
    pub fn der(&self) -> Vec<u8> {
        let r = der_integer(&self.r);
        let s = der_integer(&self.s);
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((4 + r.len() + s.len()) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    /// Parses a DER signature, validating the markers and every declared
    /// length against the buffer.
    pub fn from_der(data: &[u8]) -> Result<Self> {
        if data.len() < 6 || data[0] != 0x30 {
            return Err(Error::MalformedDer);
        }
        if data[1] as usize != data.len() - 2 {
            return Err(Error::MalformedDer);
        }
        if data[2] != 0x02 {
            return Err(Error::MalformedDer);
        }
        let rlen = data[3] as usize;
        if 4 + rlen + 2 > data.len() {
            return Err(Error::MalformedDer);
        }
        let r = BigUint::from_bytes_be(&data[4..4 + rlen]);
        if data[4 + rlen] != 0x02 {
            return Err(Error::MalformedDer);
        }
        let slen = data[5 + rlen] as usize;
        if 6 + rlen + slen != data.len() {
            return Err(Error::MalformedDer);
        }
        let s = BigUint::from_bytes_be(&data[6 + rlen..]);
        Ok(Self { r, s })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSPHRASE: &str = "vivelev@icloud.comiamfrombetelgeuse";

    #[test]
    fn test_key_from_passphrase() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let want = BigUint::parse_bytes(
            b"9522859812228304878439346382140496201827824040581168239969151541141429165742",
            10,
        )
        .unwrap();
        assert_eq!(private_key.d, want);
    }

    #[test]
    fn test_from_secret_rejects_out_of_range() {
        assert!(PrivateKey::from_secret(BigUint::zero()).is_err());
        assert!(PrivateKey::from_secret(SECP256K1.n.clone()).is_err());
        assert!(PrivateKey::from_secret(BigUint::one()).is_ok());
    }

    #[test]
    fn test_sign_verify() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let digest = hash256(b"Ford Prefect is also from Betelgeuse!");
        let signature = private_key.sign(&digest);
        assert!(private_key.public_key.verify(&digest, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let digest = hash256(b"Ford Prefect is also from Betelgeuse!");
        let signature = private_key.sign(&digest);

        let wrong_key = PrivateKey::from_passphrase("notfrombetelgeuse");
        assert!(!wrong_key.public_key.verify(&digest, &signature));
    }

    #[test]
    fn test_verify_rejects_flipped_digest_bit() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let mut digest = hash256(b"Ford Prefect is also from Betelgeuse!");
        let signature = private_key.sign(&digest);
        digest[0] ^= 0x01;
        assert!(!private_key.public_key.verify(&digest, &signature));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let digest = hash256(b"same message, same signature");
        assert_eq!(private_key.sign(&digest), private_key.sign(&digest));
    }

    #[test]
    fn test_signatures_are_low_s() {
        let half_n = &SECP256K1.n >> 1;
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        for i in 0u8..8 {
            let digest = hash256(&[i]);
            let signature = private_key.sign(&digest);
            assert!(signature.s <= half_n);
        }
    }

    #[test]
    fn test_der_round_trip() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let digest = hash256(b"Ford Prefect is also from Betelgeuse!");
        let signature = private_key.sign(&digest);
        let parsed = Signature::from_der(&signature.der()).unwrap();
        assert_eq!(parsed, signature);
    }

    #[test]
    fn test_der_rejects_bad_markers() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let der = private_key.sign(&hash256(b"x")).der();

        let mut bad = der.clone();
        bad[0] = 0x31;
        assert!(Signature::from_der(&bad).is_err());

        let mut bad = der.clone();
        bad[1] ^= 0x01;
        assert!(Signature::from_der(&bad).is_err());

        let mut bad = der;
        bad[2] = 0x03;
        assert!(Signature::from_der(&bad).is_err());

        assert!(Signature::from_der(&[]).is_err());
    }

    #[test]
    fn test_public_key_sec_round_trip() {
        let private_key = PrivateKey::from_passphrase(PASSPHRASE);
        let public_key = &private_key.public_key;
        assert_eq!(PublicKey::from_sec(&public_key.sec()).unwrap(), *public_key);
        assert_eq!(
            PublicKey::from_sec(&public_key.sec_compressed()).unwrap(),
            *public_key
        );
    }
}
