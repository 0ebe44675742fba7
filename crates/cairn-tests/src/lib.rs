//! In-memory ledger for end-to-end tests
//!
//! [`MockLedger`] keeps every block's state trie, re-checks authorization the
//! way a ledger node would, executes the contracts used in the tests and
//! commits each accepted transaction as a new block.

use std::cell::RefCell;

use cairn_calypso::{Read, Write, ARG_READ, ARG_WRITE, CONTRACT_READ, CONTRACT_WRITE};
use cairn_core::{
    Action, Authorization, BlockHeader, BlockId, ClientTransaction, Consistency, Darc, DarcId,
    DarcResolver, EngineConfig, Error, Evaluator, InstanceId, InstanceState, Ledger, Proof,
    Result, StateTrie, SubmitOutcome, ARG_DARC, CONTRACT_DARC, RULE_EVOLVE,
};

/// Contract holding an opaque value
pub const CONTRACT_VALUE: &str = "value";

/// Argument carrying the value of a value instance
pub const ARG_VALUE: &str = "value";

struct Block {
    header: BlockHeader,
    trie: StateTrie,
}

pub struct MockLedger {
    config: EngineConfig,
    blocks: RefCell<Vec<Block>>,
}

/// Resolves Darcs from one block's state
struct TrieResolver<'a>(&'a StateTrie);

impl DarcResolver for TrieResolver<'_> {
    fn resolve(&self, id: &DarcId) -> Result<Option<Darc>> {
        match load(self.0, &InstanceId::from(*id))? {
            Some(state) if state.contract_id == CONTRACT_DARC => Darc::from_bytes(&state.state).map(Some),
            _ => Ok(None),
        }
    }
}

fn load(trie: &StateTrie, id: &InstanceId) -> Result<Option<InstanceState>> {
    trie.get(id.as_bytes())
        .map(InstanceState::from_values)
        .transpose()
}

fn reject<T>(reason: impl Into<String>) -> std::result::Result<T, String> {
    Err(reason.into())
}

impl MockLedger {
    /// Ledger whose genesis block holds `genesis`
    pub fn new(genesis: &Darc) -> Self {
        let mut trie = StateTrie::new();
        let state = InstanceState::new(genesis.to_bytes(), CONTRACT_DARC, genesis.base_id());
        trie.insert(genesis.instance_id().as_bytes(), state.to_values());
        let header = BlockHeader::genesis(trie.root(), 0);
        Self {
            config: EngineConfig::default(),
            blocks: RefCell::new(vec![Block { header, trie }]),
        }
    }

    /// Id of the latest block
    pub fn head(&self) -> BlockId {
        let blocks = self.blocks.borrow();
        blocks.last().map(|b| b.header.id()).unwrap_or_default()
    }

    pub fn height(&self) -> usize {
        self.blocks.borrow().len() - 1
    }

    /// Proof against the state of block `height`, linked to the latest head
    pub fn proof_at(&self, id: &InstanceId, height: usize) -> Result<Proof> {
        let blocks = self.blocks.borrow();
        let block = blocks
            .get(height)
            .ok_or_else(|| Error::Ledger(format!("No block {}", height)))?;
        let consistency = Consistency {
            header: block.header.clone(),
            links: blocks[height + 1..].iter().map(|b| b.header.clone()).collect(),
        };
        Ok(block.trie.prove(id.as_bytes(), consistency))
    }

    fn execute(&self, trie: &mut StateTrie, tx: &ClientTransaction) -> std::result::Result<(), String> {
        for (index, instruction) in tx.instructions.iter().enumerate() {
            let Some(target) = load(trie, &instruction.instance_id).map_err(|e| e.to_string())? else {
                return reject(format!("Instruction {}: no instance {}", index, instruction.instance_id.short()));
            };
            let resolver = TrieResolver(&*trie);
            let darc = resolver
                .resolve(&target.darc_id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("Instruction {}: governing Darc missing", index))?;
            let evaluator = Evaluator::new(&resolver, &self.config);
            match evaluator.authorize_instruction(instruction, &darc) {
                Ok(Authorization::Granted) => {}
                Ok(Authorization::Denied(reason)) => return reject(format!("Instruction {}: {}", index, reason)),
                Err(e) => return reject(format!("Instruction {}: {}", index, e)),
            }

            let arg = |name: &str| {
                instruction
                    .action
                    .arg(name)
                    .ok_or_else(|| format!("Instruction {}: missing argument {:?}", index, name))
            };

            match &instruction.action {
                Action::Spawn { contract_id, .. } if contract_id == CONTRACT_DARC => {
                    let new = Darc::from_bytes(arg(ARG_DARC)?).map_err(|e| e.to_string())?;
                    if !new.is_genesis() {
                        return reject("Spawned Darc must be a genesis version");
                    }
                    let id = new.instance_id();
                    if trie.get(id.as_bytes()).is_some() {
                        return reject(format!("Darc {} exists", id.short()));
                    }
                    let state = InstanceState::new(new.to_bytes(), CONTRACT_DARC, new.base_id());
                    trie.insert(id.as_bytes(), state.to_values());
                }
                Action::Spawn { contract_id, .. } if contract_id == CONTRACT_VALUE => {
                    let state = InstanceState::new(arg(ARG_VALUE)?.to_vec(), CONTRACT_VALUE, darc.base_id());
                    trie.insert(instruction.derive_id("").as_bytes(), state.to_values());
                }
                Action::Spawn { contract_id, .. } if contract_id == CONTRACT_WRITE => {
                    let bytes = arg(ARG_WRITE)?;
                    let write = Write::from_bytes(bytes).map_err(|e| e.to_string())?;
                    write.check_proof(&darc.base_id()).map_err(|e| e.to_string())?;
                    let state = InstanceState::new(bytes.to_vec(), CONTRACT_WRITE, darc.base_id());
                    trie.insert(instruction.derive_id("").as_bytes(), state.to_values());
                }
                Action::Spawn { contract_id, .. } if contract_id == CONTRACT_READ => {
                    if target.contract_id != CONTRACT_WRITE {
                        return reject("Reads spawn from write instances");
                    }
                    let bytes = arg(ARG_READ)?;
                    let read = Read::from_bytes(bytes).map_err(|e| e.to_string())?;
                    read.validate().map_err(|e| e.to_string())?;
                    if read.write != instruction.instance_id {
                        return reject("Read names a different write");
                    }
                    if !instruction.signers().any(|id| *id == read.reader) {
                        return reject("Read is not signed by its reader");
                    }
                    let state = InstanceState::new(bytes.to_vec(), CONTRACT_READ, target.darc_id);
                    trie.insert(instruction.derive_id("").as_bytes(), state.to_values());
                }
                Action::Spawn { contract_id, .. } => {
                    return reject(format!("Unknown contract {:?}", contract_id));
                }
                Action::Invoke { command, .. } if instruction.action.rule_name() == RULE_EVOLVE => {
                    if target.contract_id != CONTRACT_DARC {
                        return reject(format!("Cannot {} a {:?}", command, target.contract_id));
                    }
                    let next = Darc::from_bytes(arg(ARG_DARC)?).map_err(|e| e.to_string())?;
                    let state = InstanceState::new(next.to_bytes(), CONTRACT_DARC, next.base_id());
                    trie.insert(instruction.instance_id.as_bytes(), state.to_values());
                }
                Action::Invoke { command, .. } if target.contract_id == CONTRACT_VALUE && command == "update" => {
                    let state = InstanceState::new(arg(ARG_VALUE)?.to_vec(), CONTRACT_VALUE, target.darc_id);
                    trie.insert(instruction.instance_id.as_bytes(), state.to_values());
                }
                Action::Invoke { command, .. } => {
                    return reject(format!("Unknown command {:?}", command));
                }
                Action::Delete { .. } => {
                    if target.contract_id == CONTRACT_DARC {
                        return reject("Darcs cannot be deleted");
                    }
                    trie.remove(instruction.instance_id.as_bytes());
                }
            }
        }
        Ok(())
    }
}

impl Ledger for MockLedger {
    fn submit(&self, tx: &ClientTransaction) -> Result<SubmitOutcome> {
        tx.validate(&self.config)?;
        let mut blocks = self.blocks.borrow_mut();
        let last = blocks
            .last()
            .ok_or_else(|| Error::Ledger("Ledger has no blocks".to_string()))?;
        let mut trie = last.trie.clone();
        if let Err(reason) = self.execute(&mut trie, tx) {
            return Ok(SubmitOutcome::Rejected(reason));
        }
        let header = last.header.next(trie.root(), last.header.timestamp + 1);
        blocks.push(Block { header, trie });
        Ok(SubmitOutcome::Accepted)
    }

    fn fetch_proof(&self, id: &InstanceId) -> Result<Proof> {
        self.proof_at(id, self.height())
    }
}
