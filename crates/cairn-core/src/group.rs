//! Prime-order group arithmetic over secp256k1
//!
//! Thin value types over k256 with the canonical encodings the rest of the
//! crate hashes and signs:
//! - scalars are 32 bytes big-endian and must be below the group order
//! - points are 33-byte SEC1 compressed encodings; the identity is 33 zero bytes

use std::ops::{Add, Mul, Neg, Sub};

use k256::{
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Size of an encoded point
pub const POINT_SIZE: usize = 33;

/// Size of an encoded scalar
pub const SCALAR_SIZE: usize = 32;

/// Maximum number of data bytes [`Point::embed`] stores in one point
pub const EMBED_LEN: usize = 30;

/// Give up on embedding after this many candidate x-coordinates
const EMBED_ATTEMPTS: usize = 256;

/// Element of the scalar field (integers modulo the group order)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(pub(crate) k256::Scalar);

impl Scalar {
    pub fn zero() -> Self {
        Self(k256::Scalar::ZERO)
    }

    pub fn one() -> Self {
        Self(k256::Scalar::ONE)
    }

    pub fn from_u64(v: u64) -> Self {
        Self(k256::Scalar::from(v))
    }

    /// Uniformly random scalar
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(k256::Scalar::random(rng))
    }

    /// Parse a canonical big-endian encoding (must be below the group order)
    pub fn from_bytes(bytes: &[u8; SCALAR_SIZE]) -> Result<Self> {
        Option::<k256::Scalar>::from(k256::Scalar::from_repr(FieldBytes::from(*bytes)))
            .map(Self)
            .ok_or(Error::InvalidScalar)
    }

    /// Interpret 32 bytes as an integer and reduce it modulo the group order
    pub fn from_bytes_reduced(bytes: &[u8; SCALAR_SIZE]) -> Self {
        Self(<k256::Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(
            *bytes,
        )))
    }

    pub fn to_bytes(&self) -> [u8; SCALAR_SIZE] {
        self.0.to_bytes().into()
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// Multiplicative inverse, `None` for zero
    pub fn invert(&self) -> Option<Self> {
        Option::<k256::Scalar>::from(self.0.invert()).map(Self)
    }
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scalar([REDACTED])")
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Add for Scalar {
    type Output = Scalar;
    fn add(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl Sub for Scalar {
    type Output = Scalar;
    fn sub(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 - rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;
    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

impl Neg for Scalar {
    type Output = Scalar;
    fn neg(self) -> Scalar {
        Scalar(-self.0)
    }
}

/// Hash arbitrary byte strings to a scalar (SHA-256, reduced modulo the order)
pub fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest: [u8; 32] = hasher.finalize().into();
    Scalar::from_bytes_reduced(&digest)
}

/// Group element
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Point(pub(crate) ProjectivePoint);

impl Point {
    pub fn generator() -> Self {
        Self(ProjectivePoint::GENERATOR)
    }

    pub fn identity() -> Self {
        Self(ProjectivePoint::IDENTITY)
    }

    /// `scalar · G`
    pub fn mul_base(scalar: &Scalar) -> Self {
        Self(ProjectivePoint::GENERATOR * scalar.0)
    }

    pub fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }

    /// Canonical 33-byte encoding
    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        let mut out = [0u8; POINT_SIZE];
        if self.is_identity() {
            return out;
        }
        let encoded = self.0.to_affine().to_encoded_point(true);
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    /// Parse a canonical 33-byte encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != POINT_SIZE {
            return Err(Error::InvalidPoint(format!(
                "Expected {} bytes, got {}",
                POINT_SIZE,
                bytes.len()
            )));
        }
        if bytes.iter().all(|b| *b == 0) {
            return Ok(Self::identity());
        }
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(Error::InvalidPoint(format!(
                "Invalid tag 0x{:02x}",
                bytes[0]
            )));
        }
        let encoded =
            EncodedPoint::from_bytes(bytes).map_err(|e| Error::InvalidPoint(e.to_string()))?;
        Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .map(|p| Self(ProjectivePoint::from(p)))
            .ok_or_else(|| Error::InvalidPoint("Not on curve".to_string()))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; POINT_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Store up to [`EMBED_LEN`] bytes of `data` in a point.
    ///
    /// The x-coordinate is `len ‖ data ‖ random padding`; candidates are drawn
    /// until one lies on the curve. Returns the point and the number of bytes
    /// consumed from `data`.
    pub fn embed<R: RngCore + CryptoRng>(data: &[u8], rng: &mut R) -> Result<(Self, usize)> {
        let len = data.len().min(EMBED_LEN);
        let mut candidate = [0u8; POINT_SIZE];
        candidate[0] = 0x02;
        for _ in 0..EMBED_ATTEMPTS {
            rng.fill_bytes(&mut candidate[1..]);
            candidate[1] = len as u8;
            candidate[2..2 + len].copy_from_slice(&data[..len]);
            if let Ok(point) = Self::from_bytes(&candidate) {
                return Ok((point, len));
            }
        }
        Err(Error::Crypto(
            "Failed to embed data in a curve point".to_string(),
        ))
    }

    /// Extract the data stored by [`Point::embed`]
    pub fn data(&self) -> Result<Vec<u8>> {
        let bytes = self.to_bytes();
        let len = bytes[1] as usize;
        if self.is_identity() || len > EMBED_LEN {
            return Err(Error::InvalidPoint(
                "Point does not carry embedded data".to_string(),
            ));
        }
        Ok(bytes[2..2 + len].to_vec())
    }

    pub(crate) fn to_affine(&self) -> AffinePoint {
        self.0.to_affine()
    }
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Point({})", self.to_hex())
    }
}

impl std::hash::Hash for Point {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point(self.0 + rhs.0)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point(self.0 - rhs.0)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point(-self.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;
    fn mul(self, rhs: Scalar) -> Point {
        Point(self.0 * rhs.0)
    }
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Point::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
