//! Identities that can appear in Darc rules, and the signers behind them

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::signature::{Signer as _, Verifier as _};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::group::{Point, Scalar, POINT_SIZE};
use crate::types::DarcId;

/// Signature algorithm bound to a public-key identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureScheme {
    /// secp256k1 ECDSA over SHA-256 of the message
    Ecdsa = 0,
    /// secp256k1 Schnorr (BIP-340)
    Schnorr = 1,
}

impl SignatureScheme {
    /// Prefix used in the text form of an identity
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ecdsa => "ecdsa",
            Self::Schnorr => "schnorr",
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ecdsa),
            1 => Some(Self::Schnorr),
            _ => None,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "ecdsa" => Some(Self::Ecdsa),
            "schnorr" => Some(Self::Schnorr),
            _ => None,
        }
    }
}

/// A credential that may satisfy a rule
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A public key that verifies raw signatures
    PublicKey(Point, SignatureScheme),
    /// Delegation to another Darc's `_sign` rule
    Darc(DarcId),
}

impl Identity {
    pub fn ecdsa(point: Point) -> Self {
        Identity::PublicKey(point, SignatureScheme::Ecdsa)
    }

    pub fn schnorr(point: Point) -> Self {
        Identity::PublicKey(point, SignatureScheme::Schnorr)
    }

    pub fn darc(id: DarcId) -> Self {
        Identity::Darc(id)
    }

    /// Verify `signature` over `msg`.
    ///
    /// Darc identities never verify locally; their authority is resolved by
    /// evaluating the referenced Darc.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        match self {
            Identity::PublicKey(point, SignatureScheme::Ecdsa) => verify_ecdsa(point, msg, signature),
            Identity::PublicKey(point, SignatureScheme::Schnorr) => {
                verify_schnorr(point, msg, signature)
            }
            Identity::Darc(_) => false,
        }
    }

    pub fn is_darc(&self) -> bool {
        matches!(self, Identity::Darc(_))
    }

    pub fn darc_id(&self) -> Option<&DarcId> {
        match self {
            Identity::Darc(id) => Some(id),
            Identity::PublicKey(..) => None,
        }
    }

    pub fn public_key(&self) -> Option<&Point> {
        match self {
            Identity::PublicKey(point, _) => Some(point),
            Identity::Darc(_) => None,
        }
    }

    /// Canonical binary form: kind byte followed by the fixed-width key or id
    pub(crate) fn encode(&self, enc: &mut Encoder) {
        match self {
            Identity::PublicKey(point, scheme) => {
                enc.put_u8(*scheme as u8).put_raw(&point.to_bytes());
            }
            Identity::Darc(id) => {
                enc.put_u8(IDENTITY_TAG_DARC).put_raw(id.as_bytes());
            }
        }
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let tag = dec.get_u8()?;
        if tag == IDENTITY_TAG_DARC {
            return Ok(Identity::Darc(DarcId::new(dec.get_array32()?)));
        }
        let scheme = SignatureScheme::from_u8(tag)
            .ok_or_else(|| Error::Encoding(format!("Unknown identity tag {}", tag)))?;
        let mut point = [0u8; POINT_SIZE];
        point[0] = dec.get_u8()?;
        point[1..].copy_from_slice(&dec.get_array32()?);
        Ok(Identity::PublicKey(Point::from_bytes(&point)?, scheme))
    }
}

const IDENTITY_TAG_DARC: u8 = 0xff;

fn verify_ecdsa(point: &Point, msg: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = k256::ecdsa::VerifyingKey::from_affine(point.to_affine()) else {
        return false;
    };
    let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

fn verify_schnorr(point: &Point, msg: &[u8], signature: &[u8]) -> bool {
    if point.is_identity() {
        return false;
    }
    // BIP-340 keys are x-only
    let encoded = point.to_bytes();
    let Ok(key) = k256::schnorr::VerifyingKey::from_bytes(&encoded[1..]) else {
        return false;
    };
    let Ok(sig) = k256::schnorr::Signature::try_from(signature) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::PublicKey(point, scheme) => write!(f, "{}:{}", scheme.prefix(), point.to_hex()),
            Identity::Darc(id) => write!(f, "darc:{}", id.to_hex()),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::PublicKey(point, scheme) => write!(
                f,
                "Identity({}:{}..)",
                scheme.prefix(),
                &point.to_hex()[..10]
            ),
            Identity::Darc(id) => write!(f, "Identity(darc:{}..)", id.short()),
        }
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, body) = s
            .split_once(':')
            .ok_or_else(|| Error::Expression(format!("Identity without kind: {:?}", s)))?;
        if prefix == "darc" {
            return Ok(Identity::Darc(DarcId::from_hex(body)?));
        }
        let scheme = SignatureScheme::from_prefix(prefix)
            .ok_or_else(|| Error::Expression(format!("Unknown identity kind: {:?}", prefix)))?;
        Ok(Identity::PublicKey(Point::from_hex(body)?, scheme))
    }
}

impl Serialize for Identity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Private key able to sign on behalf of an [`Identity`]
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Signer {
    secret: Scalar,
    #[zeroize(skip)]
    scheme: SignatureScheme,
}

impl Signer {
    /// Generate a fresh signer from the OS random source
    pub fn generate(scheme: SignatureScheme) -> Self {
        Self::generate_with(scheme, &mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(scheme: SignatureScheme, rng: &mut R) -> Self {
        loop {
            let secret = Scalar::random(rng);
            if !secret.is_zero() {
                return Self { secret, scheme };
            }
        }
    }

    pub fn from_secret(secret: Scalar, scheme: SignatureScheme) -> Result<Self> {
        if secret.is_zero() {
            return Err(Error::InvalidScalar);
        }
        Ok(Self { secret, scheme })
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Private scalar, e.g. for Calypso reader decryption
    pub fn secret(&self) -> &Scalar {
        &self.secret
    }

    pub fn public_point(&self) -> Point {
        Point::mul_base(&self.secret)
    }

    pub fn identity(&self) -> Identity {
        Identity::PublicKey(self.public_point(), self.scheme)
    }

    /// Sign `msg`; the signature verifies with [`Identity::verify`]
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        match self.scheme {
            SignatureScheme::Ecdsa => {
                let key = k256::ecdsa::SigningKey::from_bytes(&self.secret.0.to_bytes())
                    .map_err(|e| Error::Crypto(format!("Invalid signing key: {}", e)))?;
                let sig: k256::ecdsa::Signature = key
                    .try_sign(msg)
                    .map_err(|e| Error::Crypto(format!("ECDSA signing failed: {}", e)))?;
                Ok(sig.to_bytes().to_vec())
            }
            SignatureScheme::Schnorr => {
                let key = k256::schnorr::SigningKey::from_bytes(&self.secret.to_bytes())
                    .map_err(|e| Error::Crypto(format!("Invalid signing key: {}", e)))?;
                let sig: k256::schnorr::Signature = key
                    .try_sign(msg)
                    .map_err(|e| Error::Crypto(format!("Schnorr signing failed: {}", e)))?;
                Ok(sig.to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("identity", &self.identity())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
