//! Symmetric envelope for write payloads
//!
//! ChaCha20-Poly1305 under the write's key, stored as `nonce || ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{CryptoRng, RngCore};

use crate::error::{CalypsoError, Result};
use crate::reencrypt::KeyMaterial;

/// Size of the nonce in bytes
pub const NONCE_SIZE: usize = 12;

fn cipher(key: &KeyMaterial) -> Result<ChaCha20Poly1305> {
    ChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| {
        CalypsoError::Envelope(format!(
            "Key must be 32 bytes to seal a payload, got {}",
            key.len()
        ))
    })
}

/// Encrypt `plaintext` under `key`
pub fn seal<R: RngCore + CryptoRng>(key: &KeyMaterial, plaintext: &[u8], rng: &mut R) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CalypsoError::Envelope(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a payload produced by [`seal`]
pub fn open(key: &KeyMaterial, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(CalypsoError::Envelope("Sealed payload too short".to_string()));
    }
    let cipher = cipher(key)?;
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CalypsoError::Envelope(format!("Decryption failed: {}", e)))
}
