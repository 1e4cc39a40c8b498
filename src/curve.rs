//! secp256k1 scalar and point arithmetic
//!
//! Field and group operations (including the Jacobian-coordinate forms used
//! for fast multiplication) are carried out by libsecp256k1. This module
//! gives them the value semantics the key layer needs: a `Scalar` that may be
//! zero and a `Point` that may be the point at infinity.

use std::fmt;
use std::sync::OnceLock;

use secp256k1::{All, PublicKey as SecpPoint, Scalar as SecpScalar, SecretKey, Secp256k1};

use crate::error::{BitcoinError, Result};

/// Curve order n, big-endian
pub const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b,
    0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

static SECP256K1: OnceLock<Secp256k1<All>> = OnceLock::new();

/// Shared signing and verification context.
pub(crate) fn secp() -> &'static Secp256k1<All> {
    SECP256K1.get_or_init(Secp256k1::new)
}

/// Integer modulo the curve order, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Scalar([u8; 32]);

impl Scalar {
    pub const ZERO: Scalar = Scalar([0u8; 32]);

    /// Rejects values `>= n`.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Result<Self> {
        if bytes >= CURVE_ORDER {
            return Err(BitcoinError::Domain("scalar is not below the curve order".to_string()));
        }
        Ok(Scalar(bytes))
    }

    /// Accepts up to 32 big-endian bytes, left-padding shorter input.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > 32 {
            return Err(BitcoinError::Domain(format!("scalar of {} bytes is too long", bytes.len())));
        }
        let mut padded = [0u8; 32];
        padded[32 - bytes.len()..].copy_from_slice(bytes);
        Scalar::from_be_bytes(padded)
    }

    pub fn from_u64(n: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&n.to_be_bytes());
        Scalar(bytes)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Whether `self > n / 2`.
    pub fn is_high(&self) -> bool {
        // n / 2, big-endian
        const HALF_ORDER: [u8; 32] = [
            0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d,
            0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
        ];
        self.0 > HALF_ORDER
    }

    pub(crate) fn to_secret_key(self) -> Option<SecretKey> {
        SecretKey::from_slice(&self.0).ok()
    }

    fn to_tweak(self) -> SecpScalar {
        // Always below n by construction.
        SecpScalar::from_be_bytes(self.0).unwrap_or(SecpScalar::ZERO)
    }

    /// (self + other) mod n
    pub fn add(&self, other: &Scalar) -> Scalar {
        let Some(sk) = self.to_secret_key() else {
            return *other;
        };
        // add_tweak only fails when the sum is zero
        sk.add_tweak(&other.to_tweak())
            .map(|sum| Scalar(sum.secret_bytes()))
            .unwrap_or(Scalar::ZERO)
    }

    /// (self * other) mod n
    pub fn mul(&self, other: &Scalar) -> Scalar {
        match (self.to_secret_key(), other.is_zero()) {
            (Some(sk), false) => sk
                .mul_tweak(&other.to_tweak())
                .map(|product| Scalar(product.secret_bytes()))
                .unwrap_or(Scalar::ZERO),
            _ => Scalar::ZERO,
        }
    }

    /// (n - self) mod n
    pub fn negate(&self) -> Scalar {
        match self.to_secret_key() {
            Some(sk) => Scalar(sk.negate().secret_bytes()),
            None => Scalar::ZERO,
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scalar({})", hex::encode(self.0))
    }
}

/// A point on secp256k1
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Point {
    Infinity,
    Affine(SecpPoint),
}

impl Point {
    /// The generator G.
    pub fn generator() -> Point {
        Point::mul_generator(&Scalar::from_u64(1))
    }

    /// k·G
    pub fn mul_generator(k: &Scalar) -> Point {
        match k.to_secret_key() {
            Some(sk) => Point::Affine(SecpPoint::from_secret_key(secp(), &sk)),
            None => Point::Infinity,
        }
    }

    /// Builds an affine point from coordinates, checking the curve equation.
    pub fn from_coordinates(x: &[u8; 32], y: &[u8; 32]) -> Result<Point> {
        let mut sec = [0u8; 65];
        sec[0] = 0x04;
        sec[1..33].copy_from_slice(x);
        sec[33..].copy_from_slice(y);
        SecpPoint::from_slice(&sec)
            .map(Point::Affine)
            .map_err(|_| BitcoinError::Domain("point is not on the curve".to_string()))
    }

    /// Solves for y given x and the parity of y.
    pub fn lift_x(x: &[u8; 32], odd: bool) -> Result<Point> {
        let mut sec = [0u8; 33];
        sec[0] = if odd { 0x03 } else { 0x02 };
        sec[1..].copy_from_slice(x);
        SecpPoint::from_slice(&sec)
            .map(Point::Affine)
            .map_err(|_| BitcoinError::Domain("x coordinate is not on the curve".to_string()))
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Point::Infinity)
    }

    pub fn x(&self) -> Option<[u8; 32]> {
        self.uncompressed().map(|sec| {
            let mut x = [0u8; 32];
            x.copy_from_slice(&sec[1..33]);
            x
        })
    }

    pub fn y(&self) -> Option<[u8; 32]> {
        self.uncompressed().map(|sec| {
            let mut y = [0u8; 32];
            y.copy_from_slice(&sec[33..]);
            y
        })
    }

    fn uncompressed(&self) -> Option<[u8; 65]> {
        match self {
            Point::Affine(p) => Some(p.serialize_uncompressed()),
            Point::Infinity => None,
        }
    }

    pub fn add(&self, other: &Point) -> Point {
        match (self, other) {
            (Point::Infinity, q) => *q,
            (p, Point::Infinity) => *p,
            (Point::Affine(p), Point::Affine(q)) => {
                // combine only fails when the sum is the point at infinity
                p.combine(q).map(Point::Affine).unwrap_or(Point::Infinity)
            }
        }
    }

    /// k·P
    pub fn mul(&self, k: &Scalar) -> Point {
        match self {
            Point::Affine(p) if !k.is_zero() => {
                p.mul_tweak(secp(), &k.to_tweak()).map(Point::Affine).unwrap_or(Point::Infinity)
            }
            _ => Point::Infinity,
        }
    }

    pub fn negate(&self) -> Point {
        match self {
            Point::Affine(p) => Point::Affine(p.negate(secp())),
            Point::Infinity => Point::Infinity,
        }
    }

    pub(crate) fn as_secp(&self) -> Option<&SecpPoint> {
        match self {
            Point::Affine(p) => Some(p),
            Point::Infinity => None,
        }
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Infinity => write!(f, "Point(infinity)"),
            Point::Affine(p) => write!(f, "Point({})", hex::encode(p.serialize())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_range() {
        assert!(Scalar::from_be_bytes(CURVE_ORDER).is_err());
        let mut below = CURVE_ORDER;
        below[31] -= 1;
        let n_minus_one = Scalar::from_be_bytes(below).unwrap();
        assert_eq!(n_minus_one.add(&Scalar::from_u64(1)), Scalar::ZERO);
        assert_eq!(n_minus_one.negate(), Scalar::from_u64(1));
        assert!(n_minus_one.is_high());
        assert!(!Scalar::from_u64(1).is_high());
    }

    #[test]
    fn test_scalar_mul() {
        let a = Scalar::from_u64(6);
        let b = Scalar::from_u64(7);
        assert_eq!(a.mul(&b), Scalar::from_u64(42));
        assert_eq!(a.mul(&Scalar::ZERO), Scalar::ZERO);
        assert_eq!(Scalar::ZERO.add(&b), b);
    }

    #[test]
    fn test_point_group_laws() {
        let g = Point::generator();
        let two_g = g.add(&g);
        assert_eq!(two_g, Point::mul_generator(&Scalar::from_u64(2)));
        assert_eq!(g.mul(&Scalar::from_u64(3)), two_g.add(&g));
        assert_eq!(g.add(&g.negate()), Point::Infinity);
        assert_eq!(Point::Infinity.add(&g), g);
        assert!(Point::mul_generator(&Scalar::ZERO).is_infinity());
    }

    #[test]
    fn test_lift_x_matches_parity() {
        let x: [u8; 32] = hex::decode("50863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352")
            .unwrap()
            .try_into()
            .unwrap();
        let y: [u8; 32] = hex::decode("2cd470243453a299fa9e77237716103abc11a1df38855ed6f2ee187e9c582ba6")
            .unwrap()
            .try_into()
            .unwrap();
        let even = Point::lift_x(&x, false).unwrap();
        assert_eq!(even.y(), Some(y));
        assert_eq!(Point::from_coordinates(&x, &y).unwrap(), even);
        let odd = Point::lift_x(&x, true).unwrap();
        assert_eq!(odd, even.negate());
    }

    #[test]
    fn test_off_curve_rejected() {
        let x = [0x11u8; 32];
        let y = [0x22u8; 32];
        assert!(Point::from_coordinates(&x, &y).is_err());
    }
}
