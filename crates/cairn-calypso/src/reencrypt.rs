//! Reader-side key reconstruction from a re-encrypted reply

use cairn_core::{Point, Scalar, EMBED_LEN};
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CalypsoError, Result};
use crate::read::DecryptKeyReply;
use crate::write::Write;

/// Length of keys generated by [`KeyMaterial::random`]
pub const KEY_LEN: usize = 32;

/// Recovered symmetric key bytes (zeroized on drop)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Fresh random key of [`KEY_LEN`] bytes
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = vec![0u8; KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial([REDACTED; {}])", self.0.len())
    }
}

/// Check that `reply` carries exactly the chunks of `write`, in order
pub fn check_shares(write: &Write, reply: &DecryptKeyReply) -> Result<()> {
    if write.cs.is_empty() || reply.cs.is_empty() {
        return Err(CalypsoError::ShareMismatch("Empty share list".to_string()));
    }
    if write.cs.len() != reply.cs.len() {
        return Err(CalypsoError::ShareMismatch(format!(
            "Write has {} chunks, reply has {}",
            write.cs.len(),
            reply.cs.len()
        )));
    }
    if let Some(i) = write.cs.iter().zip(&reply.cs).position(|(w, r)| w != r) {
        return Err(CalypsoError::ShareMismatch(format!(
            "Chunk {} differs from the write",
            i
        )));
    }
    Ok(())
}

/// Recover the key of `write` from the quorum's `reply` using the reader's
/// private scalar.
///
/// With `X` the long-term public key and `xc` the reader's secret, the quorum
/// returns `XhatEnc = r·X + xc·X`; subtracting `xc·X` leaves `r·X`, which
/// is removed from every chunk.
#[instrument(skip_all, fields(chunks = reply.cs.len()))]
pub fn reconstruct(write: &Write, reply: &DecryptKeyReply, reader_secret: &Scalar) -> Result<KeyMaterial> {
    check_shares(write, reply)?;

    let xc_inv = -*reader_secret;
    let xhat_dec = reply.x * xc_inv;
    let xhat = reply.xhat_enc + xhat_dec;
    let xhat_inv = -xhat;

    let mut key = Vec::with_capacity(reply.cs.len() * EMBED_LEN);
    for (i, c) in reply.cs.iter().enumerate() {
        let key_point: Point = *c + xhat_inv;
        match key_point.data() {
            Ok(part) => key.extend_from_slice(&part),
            Err(e) => {
                key.zeroize();
                return Err(CalypsoError::Key(format!("Chunk {}: {}", i, e)));
            }
        }
    }
    debug!(len = key.len(), "Key reconstructed");
    Ok(KeyMaterial(key))
}
