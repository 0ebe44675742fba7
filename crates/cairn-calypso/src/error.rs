//! Error types for Calypso operations

use thiserror::Error;

/// Result type for Calypso operations
pub type Result<T> = std::result::Result<T, CalypsoError>;

/// Errors that can occur while writing, re-encrypting or recovering secrets
#[derive(Debug, Error)]
pub enum CalypsoError {
    /// Share lists of a reply and its write do not line up
    #[error("Share mismatch: {0}")]
    ShareMismatch(String),

    /// The write's proof of knowledge does not verify
    #[error("Invalid write proof: {0}")]
    InvalidProof(String),

    /// Invalid threshold
    #[error("Invalid threshold: {threshold} must be <= {participants} and >= 1")]
    InvalidThreshold {
        threshold: usize,
        participants: usize,
    },

    /// Not enough re-encrypted shares to combine
    #[error("Need {needed} shares, got {got}")]
    NotEnoughShares { needed: usize, got: usize },

    /// Key material could not be recovered or used
    #[error("Key error: {0}")]
    Key(String),

    /// Payload encryption or decryption failed
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Read flow step taken out of order
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the core library
    #[error(transparent)]
    Core(#[from] cairn_core::Error),
}

impl From<bitcode::Error> for CalypsoError {
    fn from(e: bitcode::Error) -> Self {
        CalypsoError::Serialization(e.to_string())
    }
}
