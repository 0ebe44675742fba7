//! Block headers and the link from a state root to a trusted head

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::codec::Encoder;
use crate::error::{Error, Result};
use crate::types::{BlockId, Digest};

/// Header of a committed block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct BlockHeader {
    /// Height, 0 for the genesis block
    pub index: u64,
    /// Id of the previous header (all zeros for genesis)
    pub previous: BlockId,
    /// Root of the state trie after this block
    pub state_root: Digest,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl BlockHeader {
    pub fn genesis(state_root: Digest, timestamp: u64) -> Self {
        Self {
            index: 0,
            previous: BlockId::default(),
            state_root,
            timestamp,
        }
    }

    /// Header of the block following this one
    pub fn next(&self, state_root: Digest, timestamp: u64) -> Self {
        Self {
            index: self.index.saturating_add(1),
            previous: self.id(),
            state_root,
            timestamp,
        }
    }

    pub fn id(&self) -> BlockId {
        let mut enc = Encoder::new();
        enc.put_u64(self.index)
            .put_raw(self.previous.as_bytes())
            .put_raw(self.state_root.as_bytes())
            .put_u64(self.timestamp);
        BlockId::new(enc.digest().0)
    }
}

/// The block holding a proof's root, plus the headers leading to the head
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Consistency {
    pub header: BlockHeader,
    /// Headers after `header`, oldest first; the last one is the head
    pub links: Vec<BlockHeader>,
}

impl Consistency {
    /// Consistency for a root committed directly in the head block
    pub fn at_head(header: BlockHeader) -> Self {
        Self {
            header,
            links: Vec::new(),
        }
    }

    /// Header the chain ends at
    pub fn head(&self) -> &BlockHeader {
        self.links.last().unwrap_or(&self.header)
    }

    /// Check that `header` chains through `links` to `trusted_head`
    pub fn verify(&self, trusted_head: &BlockId, max_links: usize) -> Result<()> {
        if self.links.len() > max_links {
            return Err(Error::ProofRejected(format!(
                "{} chain links exceed the limit of {}",
                self.links.len(),
                max_links
            )));
        }
        let mut current = &self.header;
        for link in &self.links {
            if link.previous != current.id() {
                return Err(Error::ProofRejected(format!(
                    "Block {} does not follow block {}",
                    link.index, current.index
                )));
            }
            if current.index.checked_add(1) != Some(link.index) {
                return Err(Error::ProofRejected(format!(
                    "Block index jumps from {} to {}",
                    current.index, link.index
                )));
            }
            current = link;
        }
        if current.id() != *trusted_head {
            return Err(Error::ProofRejected(format!(
                "Chain ends at {}, expected {}",
                current.id().short(),
                trusted_head.short()
            )));
        }
        Ok(())
    }
}
