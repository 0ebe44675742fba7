//! Cairn Calypso - on-chain secrets re-encrypted for authorized readers
//!
//! A writer encrypts a symmetric key for a quorum's long-term secret and
//! commits the [`Write`] to the ledger. A reader commits a [`Read`], the
//! quorum re-encrypts the key for the reader's public key, and the reader
//! recovers it with [`reconstruct`].

pub mod envelope;
pub mod error;
pub mod flow;
pub mod quorum;
pub mod read;
pub mod reencrypt;
pub mod write;

pub use error::{CalypsoError, Result};
pub use flow::{ReadFlow, ReadState, SecretManager};
pub use quorum::{combine, reencrypt_share, LongTermSecret, Quorum, ReencryptedShare, SecretShare};
pub use read::{DecryptKeyReply, Read, ARG_READ, CONTRACT_READ};
pub use reencrypt::{check_shares, reconstruct, KeyMaterial, KEY_LEN};
pub use write::{Write, ARG_WRITE, CONTRACT_WRITE};
