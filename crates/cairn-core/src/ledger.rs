//! Ledger access and the client session
//!
//! [`Ledger`] is implemented by a transport. [`Session`] wraps one together
//! with the configuration and the trusted chain head, and only hands out
//! state that verified against that head.

use tracing::{debug, info, instrument, warn};

use crate::auth::{Authorization, DarcResolver, Evaluator};
use crate::config::EngineConfig;
use crate::darc::{Darc, CONTRACT_DARC};
use crate::error::{Error, Result};
use crate::instruction::{ClientTransaction, Instruction};
use crate::proof::{InstanceState, Proof, ProofOutcome};
use crate::types::{BlockId, DarcId, InstanceId};

/// Answer of the ledger to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(String),
    /// Refused locally before reaching the ledger
    Denied { index: usize, reason: String },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

/// Transport to the ledger nodes
pub trait Ledger {
    fn submit(&self, tx: &ClientTransaction) -> Result<SubmitOutcome>;

    fn fetch_proof(&self, id: &InstanceId) -> Result<Proof>;
}

impl<L: Ledger + ?Sized> Ledger for &L {
    fn submit(&self, tx: &ClientTransaction) -> Result<SubmitOutcome> {
        (**self).submit(tx)
    }

    fn fetch_proof(&self, id: &InstanceId) -> Result<Proof> {
        (**self).fetch_proof(id)
    }
}

pub struct Session<L> {
    ledger: L,
    config: EngineConfig,
    trusted_head: BlockId,
}

impl<L: Ledger> Session<L> {
    pub fn new(ledger: L, config: EngineConfig, trusted_head: BlockId) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ledger,
            config,
            trusted_head,
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trusted_head(&self) -> &BlockId {
        &self.trusted_head
    }

    /// Move trust to a newer head the caller has verified
    pub fn set_trusted_head(&mut self, head: BlockId) {
        debug!(head = %head.short(), "Trusted head updated");
        self.trusted_head = head;
    }

    fn check(&self, id: &InstanceId, proof: &Proof) -> ProofOutcome {
        proof.verify_bounded(id.as_bytes(), &self.trusted_head, self.config.max_chain_links)
    }

    /// Fetch a proof for `id` and require it to show the instance
    pub fn proof(&self, id: &InstanceId) -> Result<Proof> {
        let proof = self.ledger.fetch_proof(id)?;
        match self.check(id, &proof) {
            ProofOutcome::Included(_) => Ok(proof),
            ProofOutcome::Absent => Err(Error::NotFound(format!("Instance {}", id.short()))),
            ProofOutcome::Invalid(reason) => Err(Error::ProofRejected(reason)),
        }
    }

    /// Verified state of an instance, `None` if it provably does not exist
    #[instrument(skip(self), fields(id = %id.short()))]
    pub fn instance(&self, id: &InstanceId) -> Result<Option<InstanceState>> {
        let proof = self.ledger.fetch_proof(id)?;
        let outcome = self.check(id, &proof);
        if let ProofOutcome::Invalid(reason) = &outcome {
            warn!(reason = %reason, "Ledger returned an invalid proof");
        }
        outcome.into_instance()
    }

    /// Current version of the Darc with base id `id`
    pub fn darc(&self, id: &DarcId) -> Result<Darc> {
        let state = self
            .instance(&InstanceId::from(*id))?
            .ok_or_else(|| Error::NotFound(format!("Darc {}", id.short())))?;
        if state.contract_id != CONTRACT_DARC {
            return Err(Error::NotFound(format!(
                "Instance {} holds a {:?}, not a Darc",
                id.short(),
                state.contract_id
            )));
        }
        Darc::from_bytes(&state.state)
    }

    /// Darc governing `id`
    pub fn governing_darc(&self, id: &InstanceId) -> Result<Darc> {
        let state = self
            .instance(id)?
            .ok_or_else(|| Error::NotFound(format!("Instance {}", id.short())))?;
        self.darc(&state.darc_id)
    }

    /// Check an instruction against the Darc governing its instance
    pub fn authorize(&self, instruction: &Instruction) -> Result<Authorization> {
        let darc = self.governing_darc(&instruction.instance_id)?;
        Evaluator::new(self, &self.config).authorize_instruction(instruction, &darc)
    }

    /// Validate and authorize locally, then submit. Ledger errors are
    /// returned unchanged and never retried.
    #[instrument(skip_all, fields(instructions = tx.len()))]
    pub fn submit(&self, tx: &ClientTransaction) -> Result<SubmitOutcome> {
        tx.validate(&self.config)?;
        for (index, instruction) in tx.instructions.iter().enumerate() {
            if let Authorization::Denied(reason) = self.authorize(instruction)? {
                warn!(index, reason = %reason, "Instruction not authorized");
                return Ok(SubmitOutcome::Denied { index, reason });
            }
        }
        let outcome = self.ledger.submit(tx)?;
        info!(outcome = ?outcome, "Transaction submitted");
        Ok(outcome)
    }
}

impl<L: Ledger> DarcResolver for Session<L> {
    fn resolve(&self, id: &DarcId) -> Result<Option<Darc>> {
        match self.darc(id) {
            Ok(darc) => Ok(Some(darc)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
