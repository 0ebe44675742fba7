//! Write records: key material encrypted for the long-term secret
//!
//! The key is split into chunks of up to [`EMBED_LEN`] bytes, each embedded in
//! a point `K_i` and published as `C_i = r·X + K_i` with `U = r·G`. A
//! non-interactive proof shows the writer knows `r` for both `U = r·G` and
//! `Ubar = r·Gbar`, and binds the write to the Darc that governs it.

use bitcode::{Decode, Encode};
use cairn_core::{
    hash_to_scalar, Action, Argument, DarcId, InstanceId, Point, Scalar, EMBED_LEN, POINT_SIZE,
};
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};

use crate::envelope;
use crate::error::{CalypsoError, Result};
use crate::reencrypt::KeyMaterial;

/// Contract id of write instances
pub const CONTRACT_WRITE: &str = "calypsoWrite";

/// Spawn argument carrying the encoded write
pub const ARG_WRITE: &str = "write";

/// Calypso write record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    /// Long-term secret the key is encrypted for
    pub lts_id: InstanceId,
    /// Encrypted key chunks
    pub cs: Vec<Point>,
    pub u: Point,
    pub ubar: Point,
    /// Proof challenge
    pub e: Scalar,
    /// Proof response
    pub f: Scalar,
    /// Payload sealed with the key
    pub encrypted_payload: Vec<u8>,
}

/// Second generator, derived from the long-term secret id
fn g_bar(lts_id: &InstanceId) -> Point {
    Point::mul_base(&hash_to_scalar(&[lts_id.as_bytes()]))
}

fn challenge(cs: &[Point], u: &Point, ubar: &Point, w: &Point, w_bar: &Point, darc: &DarcId) -> Scalar {
    let mut encoded: Vec<[u8; POINT_SIZE]> = cs.iter().map(Point::to_bytes).collect();
    encoded.extend([u.to_bytes(), ubar.to_bytes(), w.to_bytes(), w_bar.to_bytes()]);
    let mut parts: Vec<&[u8]> = encoded.iter().map(|p| p.as_slice()).collect();
    parts.push(darc.as_bytes());
    hash_to_scalar(&parts)
}

impl Write {
    /// Encrypt `key` for the long-term secret with public key `x`
    #[instrument(skip_all, fields(lts = %lts_id.short(), darc = %write_darc.short()))]
    pub fn new<R: RngCore + CryptoRng>(
        lts_id: InstanceId,
        write_darc: &DarcId,
        x: &Point,
        key: &[u8],
        encrypted_payload: Vec<u8>,
        rng: &mut R,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(CalypsoError::Key("Cannot write an empty key".to_string()));
        }
        let r = Scalar::random(rng);
        let c = *x * r;
        let u = Point::mul_base(&r);

        let mut cs = Vec::with_capacity(key.len().div_ceil(EMBED_LEN));
        let mut rest = key;
        while !rest.is_empty() {
            let (kp, used) = Point::embed(rest, rng)?;
            cs.push(c + kp);
            rest = &rest[used..];
        }

        let gb = g_bar(&lts_id);
        let ubar = gb * r;
        let s = Scalar::random(rng);
        let w = Point::mul_base(&s);
        let w_bar = gb * s;
        let e = challenge(&cs, &u, &ubar, &w, &w_bar, write_darc);
        let f = s + e * r;
        debug!(chunks = cs.len(), "Key encrypted");

        Ok(Self {
            lts_id,
            cs,
            u,
            ubar,
            e,
            f,
            encrypted_payload,
        })
    }

    /// Seal `payload` under a fresh key and write that key for the long-term
    /// secret. Returns the write and the key.
    pub fn seal<R: RngCore + CryptoRng>(
        lts_id: InstanceId,
        write_darc: &DarcId,
        x: &Point,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<(Self, KeyMaterial)> {
        let key = KeyMaterial::random(rng);
        let sealed = envelope::seal(&key, payload, rng)?;
        let write = Self::new(lts_id, write_darc, x, key.as_bytes(), sealed, rng)?;
        Ok((write, key))
    }

    /// Check the proof of knowledge against the governing Darc
    pub fn check_proof(&self, write_darc: &DarcId) -> Result<()> {
        let w = Point::mul_base(&self.f) + self.u * (-self.e);
        let gb = g_bar(&self.lts_id);
        let w_bar = gb * self.f + self.ubar * (-self.e);
        let e = challenge(&self.cs, &self.u, &self.ubar, &w, &w_bar, write_darc);
        if e != self.e {
            return Err(CalypsoError::InvalidProof(
                "Recomputed challenge differs".to_string(),
            ));
        }
        Ok(())
    }

    /// Spawn action creating a write instance
    pub fn spawn_action(&self) -> Action {
        Action::Spawn {
            contract_id: CONTRACT_WRITE.to_string(),
            args: vec![Argument::new(ARG_WRITE, self.to_bytes())],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(&WriteWire {
            lts_id: self.lts_id.0,
            cs: self.cs.iter().map(Point::to_bytes).collect(),
            u: self.u.to_bytes(),
            ubar: self.ubar.to_bytes(),
            e: self.e.to_bytes(),
            f: self.f.to_bytes(),
            encrypted_payload: self.encrypted_payload.clone(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wire: WriteWire = bitcode::decode(bytes)?;
        Ok(Self {
            lts_id: InstanceId::new(wire.lts_id),
            cs: wire
                .cs
                .iter()
                .map(|c| Point::from_bytes(c))
                .collect::<cairn_core::Result<Vec<_>>>()?,
            u: Point::from_bytes(&wire.u)?,
            ubar: Point::from_bytes(&wire.ubar)?,
            e: Scalar::from_bytes(&wire.e)?,
            f: Scalar::from_bytes(&wire.f)?,
            encrypted_payload: wire.encrypted_payload,
        })
    }
}

#[derive(Encode, Decode)]
struct WriteWire {
    lts_id: [u8; 32],
    cs: Vec<[u8; POINT_SIZE]>,
    u: [u8; POINT_SIZE],
    ubar: [u8; POINT_SIZE],
    e: [u8; 32],
    f: [u8; 32],
    encrypted_payload: Vec<u8>,
}
