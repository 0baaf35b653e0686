//! secp256k1 elliptic-curve engine.
//!
//! Short-Weierstrass group law over F_p with affine coordinates. The point
//! at infinity is represented as (0, 0), which is not on the curve but acts
//! as the additive identity.

use crate::error::{Error, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use std::sync::LazyLock;

/// Parameters of an elliptic curve y^2 = x^3 + a*x + b over F_p.
#[derive(Debug, Clone)]
pub struct CurveParams {
    /// Order of the underlying prime field.
    pub p: BigUint,
    /// Order of the base-point group.
    pub n: BigUint,
    /// Curve constant a.
    pub a: BigUint,
    /// Curve constant b.
    pub b: BigUint,
    /// x coordinate of the base point.
    pub gx: BigUint,
    /// y coordinate of the base point.
    pub gy: BigUint,
    /// Size of the underlying field in bits.
    pub bit_size: u32,
}

/// Bitcoin's secp256k1 curve.
///
/// p = 2^256 - 2^32 - 977, a = 0, b = 7.
pub static SECP256K1: LazyLock<CurveParams> = LazyLock::new(|| CurveParams {
    p: biguint_hex("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F"),
    n: biguint_hex("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141"),
    a: BigUint::zero(),
    b: BigUint::from(7u32),
    gx: biguint_hex("79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798"),
    gy: biguint_hex("483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8"),
    bit_size: 256,
});

fn biguint_hex(s: &str) -> BigUint {
    BigUint::parse_bytes(s.as_bytes(), 16).expect("valid hex constant")
}

/// A point on the curve in affine coordinates, or the point at infinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinePoint {
    pub x: BigUint,
    pub y: BigUint,
}

impl AffinePoint {
    pub fn new(x: BigUint, y: BigUint) -> Self {
        Self { x, y }
    }

    /// The additive identity, (0, 0) by convention.
    pub fn infinity() -> Self {
        Self { x: BigUint::zero(), y: BigUint::zero() }
    }

    pub fn is_infinity(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }
}

fn mod_sub(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    ((a % m) + m - (b % m)) % m
}

fn mod_inv(a: &BigUint, m: &BigUint) -> BigUint {
    // m is prime throughout this crate, so Fermat applies
    a.modpow(&(m - 2u32), m)
}

impl CurveParams {
    /// x^3 + a*x + b (mod p).
    fn polynomial(&self, x: &BigUint) -> BigUint {
        (x * x * x + &self.a * x + &self.b) % &self.p
    }

    /// Whether (x, y) satisfies the curve equation. The infinity point
    /// (0, 0) is not on the curve.
    pub fn is_on_curve(&self, x: &BigUint, y: &BigUint) -> bool {
        (y * y) % &self.p == self.polynomial(x)
    }

    /// Group addition, covering identity, inverse and doubling cases.
    pub fn add(&self, p1: &AffinePoint, p2: &AffinePoint) -> AffinePoint {
        if p1.is_infinity() {
            return p2.clone();
        }
        if p2.is_infinity() {
            return p1.clone();
        }
        // additive inverse: same x, different y
        if p1.x == p2.x && p1.y != p2.y {
            return AffinePoint::infinity();
        }

        let m = if p1 == p2 {
            // vertical tangent
            if p1.y.is_zero() {
                return AffinePoint::infinity();
            }
            // m = (3*x^2 + a) / (2*y)
            let numerator = (BigUint::from(3u32) * &p1.x * &p1.x + &self.a) % &self.p;
            let denominator = (BigUint::from(2u32) * &p1.y) % &self.p;
            (numerator * mod_inv(&denominator, &self.p)) % &self.p
        } else {
            // m = (y1 - y2) / (x1 - x2)
            let numerator = mod_sub(&p1.y, &p2.y, &self.p);
            let denominator = mod_sub(&p1.x, &p2.x, &self.p);
            (numerator * mod_inv(&denominator, &self.p)) % &self.p
        };

        // x3 = m^2 - x1 - x2
        let x3 = mod_sub(&mod_sub(&(&m * &m), &p1.x, &self.p), &p2.x, &self.p);
        // y3 = m*(x1 - x3) - y1
        let y3 = mod_sub(&(&m * mod_sub(&p1.x, &x3, &self.p)), &p1.y, &self.p);
        AffinePoint::new(x3, y3)
    }

    /// Scalar multiplication by double-and-add, LSB first.
    ///
    /// Always walks the full 256 bit positions so the iteration count does
    /// not depend on the scalar.
    pub fn scalar_mult(&self, point: &AffinePoint, k: &BigUint) -> AffinePoint {
        let mut result = AffinePoint::infinity();
        let mut addend = point.clone();
        for i in 0..u64::from(self.bit_size) {
            if k.bit(i) {
                result = self.add(&result, &addend);
            }
            addend = self.add(&addend, &addend);
        }
        result
    }

    /// k * G for the curve's base point.
    pub fn scalar_base_mult(&self, k: &BigUint) -> AffinePoint {
        self.scalar_mult(&self.generator(), k)
    }

    /// The base point G.
    pub fn generator(&self) -> AffinePoint {
        AffinePoint::new(self.gx.clone(), self.gy.clone())
    }

    /// Square root modulo p, valid because p ≡ 3 (mod 4) for secp256k1.
    fn mod_sqrt(&self, a: &BigUint) -> BigUint {
        let exponent = (&self.p + 1u32) >> 2;
        a.modpow(&exponent, &self.p)
    }
}

/// Left-pads a field element to its 32-byte big-endian form.
pub fn be_bytes_32(n: &BigUint) -> [u8; 32] {
    let bytes = n.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// SEC1 uncompressed serialization: 0x04 ‖ x ‖ y.
pub fn marshal(point: &AffinePoint) -> [u8; 65] {
    let mut out = [0u8; 65];
    out[0] = 0x04;
    out[1..33].copy_from_slice(&be_bytes_32(&point.x));
    out[33..].copy_from_slice(&be_bytes_32(&point.y));
    out
}

/// SEC1 compressed serialization: 0x02/0x03 ‖ x, prefix by y parity.
pub fn marshal_compressed(point: &AffinePoint) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = if point.y.bit(0) { 0x03 } else { 0x02 };
    out[1..].copy_from_slice(&be_bytes_32(&point.x));
    out
}

/// Parses either SEC1 form. Compressed points recover y by the modular
/// square root of the curve polynomial, picking the root whose parity
/// matches the prefix.
pub fn unmarshal(curve: &CurveParams, data: &[u8]) -> Result<AffinePoint> {
    match data.first() {
        Some(0x04) if data.len() == 65 => {
            let x = BigUint::from_bytes_be(&data[1..33]);
            let y = BigUint::from_bytes_be(&data[33..]);
            if !curve.is_on_curve(&x, &y) {
                return Err(Error::InvalidPoint);
            }
            Ok(AffinePoint::new(x, y))
        }
        Some(prefix @ (0x02 | 0x03)) if data.len() == 33 => {
            let x = BigUint::from_bytes_be(&data[1..]);
            let alpha = curve.polynomial(&x);
            let beta = curve.mod_sqrt(&alpha);
            if (&beta * &beta) % &curve.p != alpha {
                // the polynomial value is a quadratic non-residue
                return Err(Error::InvalidPoint);
            }
            let want_odd = *prefix == 0x03;
            let y = if beta.bit(0) == want_odd { beta } else { mod_sub(&curve.p, &beta, &curve.p) };
            Ok(AffinePoint::new(x, y))
        }
        _ => Err(Error::BadPointEncoding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_on_curve() {
        let curve = &*SECP256K1;
        assert!(curve.is_on_curve(&curve.gx, &curve.gy));
    }

    #[test]
    fn test_infinity_not_on_curve() {
        let curve = &*SECP256K1;
        assert!(!curve.is_on_curve(&BigUint::zero(), &BigUint::zero()));
    }

    #[test]
    fn test_add_identity() {
        let curve = &*SECP256K1;
        let g = curve.generator();
        assert_eq!(curve.add(&AffinePoint::infinity(), &g), g);
        assert_eq!(curve.add(&g, &AffinePoint::infinity()), g);
    }

    #[test]
    fn test_add_inverse_is_infinity() {
        let curve = &*SECP256K1;
        let g = curve.generator();
        let neg_g = AffinePoint::new(g.x.clone(), &curve.p - &g.y);
        assert!(curve.add(&g, &neg_g).is_infinity());
    }

    #[test]
    fn test_double_generator() {
        let curve = &*SECP256K1;
        let g = curve.generator();
        let two_g = curve.add(&g, &g);
        assert_eq!(
            two_g.x,
            BigUint::parse_bytes(
                b"C6047F9441ED7D6D3045406E95C07CD85C778E4B8CEF3CA7ABAC09B95C709EE5",
                16
            )
            .unwrap()
        );
        assert_eq!(
            two_g.y,
            BigUint::parse_bytes(
                b"1AE168FEA63DC339A3C58419466CEAEEF7F632653266D0E1236431A950CFE52A",
                16
            )
            .unwrap()
        );
    }

    #[test]
    fn test_scalar_mult_matches_repeated_add() {
        let curve = &*SECP256K1;
        let g = curve.generator();
        let mut acc = AffinePoint::infinity();
        for k in 1u32..=8 {
            acc = curve.add(&acc, &g);
            assert_eq!(curve.scalar_base_mult(&BigUint::from(k)), acc);
        }
    }

    #[test]
    fn test_scalar_mult_stays_on_curve() {
        let curve = &*SECP256K1;
        for k in [1u64, 2, 3, 0xdeadbeef, u64::MAX] {
            let point = curve.scalar_base_mult(&BigUint::from(k));
            assert!(curve.is_on_curve(&point.x, &point.y));
        }
    }

    #[test]
    fn test_order_times_generator_is_infinity() {
        let curve = &*SECP256K1;
        assert!(curve.scalar_base_mult(&curve.n).is_infinity());
    }

    #[test]
    fn test_sec_uncompressed_round_trip() {
        let curve = &*SECP256K1;
        let g = curve.generator();
        let buf = marshal(&g);
        assert_eq!(buf.len(), 65);
        assert_eq!(unmarshal(curve, &buf).unwrap(), g);
    }

    #[test]
    fn test_sec_compressed_round_trip() {
        let curve = &*SECP256K1;
        for k in [1u32, 2, 3, 5, 8, 13] {
            let point = curve.scalar_base_mult(&BigUint::from(k));
            let buf = marshal_compressed(&point);
            assert_eq!(unmarshal(curve, &buf).unwrap(), point);
        }
    }

    #[test]
    fn test_sec_bad_prefix() {
        let curve = &*SECP256K1;
        let mut buf = marshal_compressed(&curve.generator());
        buf[0] = 0x05;
        assert!(matches!(unmarshal(curve, &buf), Err(Error::BadPointEncoding)));
    }

    #[test]
    fn test_sec_point_off_curve() {
        let curve = &*SECP256K1;
        let mut buf = marshal(&curve.generator());
        buf[64] ^= 0x01;
        assert!(matches!(unmarshal(curve, &buf), Err(Error::InvalidPoint)));
    }
}
