//! Reader side of a Calypso read, as a state machine
//!
//! `WriteCommitted → ReadRequested → SharesReceived → KeyReconstructed`.
//! Each step checks the current state and fails with
//! [`CalypsoError::InvalidState`] when called out of order.

use cairn_core::{Instruction, InstanceId, Proof, Scalar, Signer};
use tracing::{debug, info, instrument};

use crate::envelope;
use crate::error::{CalypsoError, Result};
use crate::read::{DecryptKeyReply, Read};
use crate::reencrypt::{self, KeyMaterial};
use crate::write::Write;

/// Access to the quorum holding the long-term secret
pub trait SecretManager {
    /// Re-encrypt the write for `read`, given proofs that both are committed
    fn request_reencryption(
        &self,
        read: &Read,
        write_proof: &Proof,
        read_proof: &Proof,
    ) -> Result<DecryptKeyReply>;
}

impl<M: SecretManager + ?Sized> SecretManager for &M {
    fn request_reencryption(
        &self,
        read: &Read,
        write_proof: &Proof,
        read_proof: &Proof,
    ) -> Result<DecryptKeyReply> {
        (**self).request_reencryption(read, write_proof, read_proof)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    WriteCommitted,
    ReadRequested,
    SharesReceived,
    KeyReconstructed,
}

impl std::fmt::Display for ReadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReadState::WriteCommitted => "write committed",
            ReadState::ReadRequested => "read requested",
            ReadState::SharesReceived => "shares received",
            ReadState::KeyReconstructed => "key reconstructed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ReadFlow {
    write_id: InstanceId,
    write: Write,
    state: ReadState,
    read: Option<Read>,
    read_id: Option<InstanceId>,
    reply: Option<DecryptKeyReply>,
    key: Option<KeyMaterial>,
}

impl ReadFlow {
    /// Start reading the committed write stored at `write_id`
    pub fn new(write_id: InstanceId, write: Write) -> Self {
        Self {
            write_id,
            write,
            state: ReadState::WriteCommitted,
            read: None,
            read_id: None,
            reply: None,
            key: None,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    pub fn write(&self) -> &Write {
        &self.write
    }

    pub fn read(&self) -> Option<&Read> {
        self.read.as_ref()
    }

    /// Instance id the read will get once the request is committed
    pub fn read_id(&self) -> Option<InstanceId> {
        self.read_id
    }

    fn require(&self, state: ReadState, step: &str) -> Result<()> {
        if self.state != state {
            return Err(CalypsoError::InvalidState(format!(
                "Cannot {} while {}",
                step, self.state
            )));
        }
        Ok(())
    }

    /// Signed instruction spawning the read under the write instance
    #[instrument(skip_all, fields(write = %self.write_id.short()))]
    pub fn request(&mut self, reader: &Signer) -> Result<Instruction> {
        self.require(ReadState::WriteCommitted, "request a read")?;
        let read = Read::new(self.write_id, reader);
        let mut instruction = Instruction::new(self.write_id, read.spawn_action(), 0, 1)?;
        instruction.sign_by(&[reader])?;

        let read_id = instruction.derive_id("");
        debug!(read = %read_id.short(), "Read requested");
        self.read = Some(read);
        self.read_id = Some(read_id);
        self.state = ReadState::ReadRequested;
        Ok(instruction)
    }

    /// Ask `manager` to re-encrypt, presenting proofs of the write and read
    pub fn fetch_reply<M: SecretManager>(
        &mut self,
        manager: &M,
        write_proof: &Proof,
        read_proof: &Proof,
    ) -> Result<()> {
        self.require(ReadState::ReadRequested, "fetch a reply")?;
        let read = self
            .read
            .as_ref()
            .ok_or_else(|| CalypsoError::InvalidState("No read recorded".to_string()))?;
        let reply = manager.request_reencryption(read, write_proof, read_proof)?;
        self.receive_shares(reply)
    }

    /// Accept a reply obtained out of band
    pub fn receive_shares(&mut self, reply: DecryptKeyReply) -> Result<()> {
        self.require(ReadState::ReadRequested, "receive shares")?;
        reencrypt::check_shares(&self.write, &reply)?;
        self.reply = Some(reply);
        self.state = ReadState::SharesReceived;
        Ok(())
    }

    /// Recover the key with the reader's secret scalar
    pub fn reconstruct(&mut self, reader_secret: &Scalar) -> Result<&KeyMaterial> {
        self.require(ReadState::SharesReceived, "reconstruct the key")?;
        let reply = self
            .reply
            .as_ref()
            .ok_or_else(|| CalypsoError::InvalidState("No reply recorded".to_string()))?;
        let key = reencrypt::reconstruct(&self.write, reply, reader_secret)?;
        info!(write = %self.write_id.short(), "Key recovered");
        self.state = ReadState::KeyReconstructed;
        Ok(self.key.insert(key))
    }

    /// Open the write's payload with the recovered key
    pub fn decrypt_payload(&self) -> Result<Vec<u8>> {
        self.require(ReadState::KeyReconstructed, "decrypt the payload")?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| CalypsoError::InvalidState("No key recovered".to_string()))?;
        envelope::open(key, &self.write.encrypted_payload)
    }
}
