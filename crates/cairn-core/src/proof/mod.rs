//! Inclusion and absence proofs for ledger state
//!
//! State is committed in a sparse binary Merkle tree of depth 256. A key lives
//! at the leaf selected by the bits of `SHA-256(key)`, most significant bit
//! first from the root. Hashes:
//! - empty leaf: `H(0x00)`
//! - occupied leaf: `H(0x01 ‖ len ‖ key ‖ count ‖ (len ‖ value)*)`
//! - interior node: `H(0x02 ‖ left ‖ right)`
//!
//! with lengths as little-endian `u32`. The root is tied to a trusted chain
//! head through a [`Consistency`] link.

mod chain;
mod trie;

pub use chain::{BlockHeader, Consistency};
pub use trie::StateTrie;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::codec::{sha256, Encoder};
use crate::error::{Error, Result};
use crate::types::{BlockId, DarcId, Digest};

/// Depth of the state tree
pub const TREE_DEPTH: usize = 256;

/// Chain links accepted by [`Proof::verify`]
pub const DEFAULT_MAX_CHAIN_LINKS: usize = 1024;

const TAG_EMPTY: u8 = 0x00;
const TAG_LEAF: u8 = 0x01;
const TAG_NODE: u8 = 0x02;

/// Leaf at the end of a proof path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum Leaf {
    Empty,
    Occupied { key: Vec<u8>, values: Vec<Vec<u8>> },
}

impl Leaf {
    pub fn hash(&self) -> Digest {
        match self {
            Leaf::Empty => sha256(&[TAG_EMPTY]),
            Leaf::Occupied { key, values } => {
                let mut enc = Encoder::new();
                enc.put_u8(TAG_LEAF)
                    .put_bytes(key)
                    .put_u32(values.len() as u32);
                for value in values {
                    enc.put_bytes(value);
                }
                enc.digest()
            }
        }
    }
}

/// Interior node hash
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    let mut enc = Encoder::new();
    enc.put_u8(TAG_NODE)
        .put_raw(left.as_bytes())
        .put_raw(right.as_bytes());
    enc.digest()
}

/// Position of `key` in the tree
pub fn key_path(key: &[u8]) -> Digest {
    sha256(key)
}

/// Bit `i` of `path`, counting from the most significant bit
pub(crate) fn path_bit(path: &Digest, i: usize) -> bool {
    (path.0[i / 8] >> (7 - (i % 8))) & 1 == 1
}

/// Side of its parent the running node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn from_bit(bit: bool) -> Self {
        if bit {
            Direction::Right
        } else {
            Direction::Left
        }
    }
}

/// One level of a proof path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Step {
    pub sibling: Digest,
    pub direction: Direction,
}

/// Result of checking a proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    /// The key is committed with these values
    Included(Vec<Vec<u8>>),
    /// The key is provably not committed
    Absent,
    /// The proof does not check out and nothing in it can be trusted
    Invalid(String),
}

impl ProofOutcome {
    pub fn is_valid(&self) -> bool {
        !matches!(self, ProofOutcome::Invalid(_))
    }

    /// Decode the values of an included instance
    pub fn into_instance(self) -> Result<Option<InstanceState>> {
        match self {
            ProofOutcome::Included(values) => InstanceState::from_values(&values).map(Some),
            ProofOutcome::Absent => Ok(None),
            ProofOutcome::Invalid(reason) => Err(Error::ProofRejected(reason)),
        }
    }
}

/// Instance values as stored in a leaf: `[state, contract_id, darc_id]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub state: Vec<u8>,
    pub contract_id: String,
    pub darc_id: DarcId,
}

impl InstanceState {
    pub fn new(state: Vec<u8>, contract_id: &str, darc_id: DarcId) -> Self {
        Self {
            state,
            contract_id: contract_id.to_string(),
            darc_id,
        }
    }

    pub fn from_values(values: &[Vec<u8>]) -> Result<Self> {
        let [state, contract, darc] = values else {
            return Err(Error::Encoding(format!(
                "Instance needs 3 values, got {}",
                values.len()
            )));
        };
        let contract_id = String::from_utf8(contract.clone())
            .map_err(|e| Error::Encoding(format!("Contract id is not UTF-8: {}", e)))?;
        let darc_id = DarcId::from_slice(darc)
            .ok_or_else(|| Error::Encoding(format!("Darc id has {} bytes", darc.len())))?;
        Ok(Self {
            state: state.clone(),
            contract_id,
            darc_id,
        })
    }

    pub fn to_values(&self) -> Vec<Vec<u8>> {
        vec![
            self.state.clone(),
            self.contract_id.as_bytes().to_vec(),
            self.darc_id.as_bytes().to_vec(),
        ]
    }
}

/// Leaf, path to the root, and the link from that root to a chain head
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Proof {
    pub leaf: Leaf,
    /// Leaf to root
    pub path: Vec<Step>,
    pub consistency: Consistency,
}

impl Proof {
    /// Verify the proof for `key` against a trusted chain head
    pub fn verify(&self, key: &[u8], trusted_head: &BlockId) -> ProofOutcome {
        self.verify_bounded(key, trusted_head, DEFAULT_MAX_CHAIN_LINKS)
    }

    /// As [`Proof::verify`], accepting at most `max_links` chain links
    #[instrument(skip_all, fields(head = %trusted_head.short()))]
    pub fn verify_bounded(&self, key: &[u8], trusted_head: &BlockId, max_links: usize) -> ProofOutcome {
        if let Err(e) = self.consistency.verify(trusted_head, max_links) {
            warn!(error = %e, "Consistency check failed");
            return ProofOutcome::Invalid(e.to_string());
        }
        self.verify_root(key, &self.consistency.header.state_root)
    }

    /// Verify the proof for `key` against a directly trusted root
    pub fn verify_root(&self, key: &[u8], root: &Digest) -> ProofOutcome {
        if self.path.len() != TREE_DEPTH {
            return ProofOutcome::Invalid(format!(
                "Path has {} steps, expected {}",
                self.path.len(),
                TREE_DEPTH
            ));
        }
        let position = key_path(key);
        let mut running = self.leaf.hash();
        for (i, step) in self.path.iter().enumerate() {
            let bit = path_bit(&position, TREE_DEPTH - 1 - i);
            if step.direction != Direction::from_bit(bit) {
                return ProofOutcome::Invalid(format!("Step {} goes the wrong way", i));
            }
            running = match step.direction {
                Direction::Left => node_hash(&running, &step.sibling),
                Direction::Right => node_hash(&step.sibling, &running),
            };
        }
        if running != *root {
            debug!(computed = %running.short(), expected = %root.short(), "Root mismatch");
            return ProofOutcome::Invalid("Computed root does not match".to_string());
        }
        match &self.leaf {
            Leaf::Empty => ProofOutcome::Absent,
            Leaf::Occupied { key: leaf_key, .. } if leaf_key.as_slice() != key => {
                ProofOutcome::Invalid("Proof is for a different key".to_string())
            }
            Leaf::Occupied { values, .. } => ProofOutcome::Included(values.clone()),
        }
    }

    /// Whether the leaf holds `key`; says nothing about validity
    pub fn matches(&self, key: &[u8]) -> bool {
        matches!(&self.leaf, Leaf::Occupied { key: k, .. } if k.as_slice() == key)
    }

    pub fn key(&self) -> Option<&[u8]> {
        match &self.leaf {
            Leaf::Occupied { key, .. } => Some(key),
            Leaf::Empty => None,
        }
    }

    /// Leaf values; empty for an absence proof
    pub fn values(&self) -> &[Vec<u8>] {
        match &self.leaf {
            Leaf::Occupied { values, .. } => values,
            Leaf::Empty => &[],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bitcode::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bitcode::decode(bytes)?)
    }
}
