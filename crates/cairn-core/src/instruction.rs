//! Instructions and client transactions
//!
//! An instruction asks the ledger to spawn, invoke or delete an instance.
//! Signers sign [`Instruction::hash`], which covers every field except the
//! signatures, so independent signers can sign the same instruction out of
//! band and attach their signatures in any order.

use std::collections::BTreeSet;

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::Encoder;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::identity::{Identity, Signer};
use crate::types::{Digest, InstanceId, Nonce};

/// Argument carrying a serialized Darc in spawn and evolve instructions
pub const ARG_DARC: &str = "darc";

const TAG_SPAWN: u8 = 0;
const TAG_INVOKE: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Named argument of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Vec<u8>,
}

impl Argument {
    pub fn new(name: &str, value: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Create a new instance of `contract_id`
    Spawn {
        contract_id: String,
        args: Vec<Argument>,
    },
    /// Run `command` on an existing instance
    Invoke {
        contract_id: String,
        command: String,
        args: Vec<Argument>,
    },
    /// Remove an instance
    Delete { contract_id: String },
}

impl Action {
    /// Name of the Darc rule that must authorize this action
    pub fn rule_name(&self) -> String {
        match self {
            Action::Spawn { contract_id, .. } => format!("spawn:{}", contract_id),
            Action::Invoke { command, .. } => format!("invoke:{}", command),
            Action::Delete { .. } => "delete".to_string(),
        }
    }

    pub fn contract_id(&self) -> &str {
        match self {
            Action::Spawn { contract_id, .. }
            | Action::Invoke { contract_id, .. }
            | Action::Delete { contract_id } => contract_id,
        }
    }

    pub fn args(&self) -> &[Argument] {
        match self {
            Action::Spawn { args, .. } | Action::Invoke { args, .. } => args,
            Action::Delete { .. } => &[],
        }
    }

    /// Value of the first argument called `name`
    pub fn arg(&self, name: &str) -> Option<&[u8]> {
        self.args()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_slice())
    }

    fn encode(&self, enc: &mut Encoder) {
        match self {
            Action::Spawn { contract_id, args } => {
                enc.put_u8(TAG_SPAWN).put_bytes(contract_id.as_bytes());
                encode_args(enc, args);
            }
            Action::Invoke {
                contract_id,
                command,
                args,
            } => {
                enc.put_u8(TAG_INVOKE)
                    .put_bytes(contract_id.as_bytes())
                    .put_bytes(command.as_bytes());
                encode_args(enc, args);
            }
            Action::Delete { contract_id } => {
                enc.put_u8(TAG_DELETE).put_bytes(contract_id.as_bytes());
            }
        }
    }
}

fn encode_args(enc: &mut Encoder, args: &[Argument]) {
    enc.put_u32(args.len() as u32);
    for arg in args {
        enc.put_bytes(arg.name.as_bytes()).put_bytes(&arg.value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub instance_id: InstanceId,
    pub nonce: Nonce,
    /// Position in the transaction
    pub index: u32,
    /// Number of instructions in the transaction
    pub length: u32,
    pub action: Action,
    pub signatures: Vec<(Identity, Vec<u8>)>,
}

impl Instruction {
    /// New unsigned instruction with a fresh random nonce
    pub fn new(instance_id: InstanceId, action: Action, index: u32, length: u32) -> Result<Self> {
        let mut nonce = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| Error::Entropy(e.to_string()))?;
        Ok(Self::with_nonce(instance_id, Nonce::new(nonce), action, index, length))
    }

    pub fn with_nonce(
        instance_id: InstanceId,
        nonce: Nonce,
        action: Action,
        index: u32,
        length: u32,
    ) -> Self {
        Self {
            instance_id,
            nonce,
            index,
            length,
            action,
            signatures: Vec::new(),
        }
    }

    /// Signing hash over every field except the signatures
    pub fn hash(&self) -> Digest {
        let mut enc = Encoder::new();
        enc.put_raw(self.instance_id.as_bytes())
            .put_raw(self.nonce.as_bytes())
            .put_u32(self.index)
            .put_u32(self.length);
        self.action.encode(&mut enc);
        enc.digest()
    }

    /// Id of an instance created by this instruction, disambiguated by `what`
    pub fn derive_id(&self, what: &str) -> InstanceId {
        let mut enc = Encoder::new();
        enc.put_raw(self.hash().as_bytes())
            .put_u32(self.signatures.len() as u32);
        for (_, signature) in &self.signatures {
            enc.put_bytes(signature);
        }
        enc.put_raw(what.as_bytes());
        InstanceId::new(enc.digest().0)
    }

    /// Append a signature without checking it
    pub fn attach_signature(&mut self, identity: Identity, signature: Vec<u8>) {
        self.signatures.push((identity, signature));
    }

    /// Sign the instruction hash with each signer
    pub fn sign_by(&mut self, signers: &[&Signer]) -> Result<()> {
        let hash = self.hash();
        for signer in signers {
            let signature = signer.sign(hash.as_bytes())?;
            self.attach_signature(signer.identity(), signature);
        }
        Ok(())
    }

    pub fn signers(&self) -> impl Iterator<Item = &Identity> {
        self.signatures.iter().map(|(id, _)| id)
    }
}

/// Ordered batch of instructions submitted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTransaction {
    pub instructions: Vec<Instruction>,
}

impl ClientTransaction {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// One instruction per action against `instance_id`, with indices and
    /// nonces assigned in order
    pub fn from_actions(instance_id: InstanceId, actions: Vec<Action>) -> Result<Self> {
        let length = u32::try_from(actions.len())
            .map_err(|_| Error::Structural("Too many instructions".to_string()))?;
        let instructions = actions
            .into_iter()
            .enumerate()
            .map(|(i, action)| Instruction::new(instance_id, action, i as u32, length))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { instructions })
    }

    /// Check indices are unique, contiguous from zero, and agree with the
    /// transaction length
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        let n = self.instructions.len();
        if n == 0 {
            return Err(Error::Structural("Empty transaction".to_string()));
        }
        if n > config.max_instructions {
            return Err(Error::Structural(format!(
                "{} instructions exceed the limit of {}",
                n, config.max_instructions
            )));
        }
        let mut seen = BTreeSet::new();
        for (pos, instr) in self.instructions.iter().enumerate() {
            if instr.length as usize != n {
                return Err(Error::Structural(format!(
                    "Instruction {} claims length {}, transaction has {}",
                    pos, instr.length, n
                )));
            }
            if !seen.insert(instr.index) {
                return Err(Error::Structural(format!("Duplicate index {}", instr.index)));
            }
            if instr.index as usize != pos {
                return Err(Error::Structural(format!(
                    "Instruction at position {} has index {}",
                    pos, instr.index
                )));
            }
        }
        debug!(instructions = n, "Transaction validated");
        Ok(())
    }

    /// Hash over the signing hashes of all instructions
    pub fn hash(&self) -> Digest {
        let mut enc = Encoder::new();
        for instr in &self.instructions {
            enc.put_raw(instr.hash().as_bytes());
        }
        enc.digest()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
