//! In-memory sparse Merkle tree that produces roots and proofs
//!
//! Used by ledger simulators and tests; the verifier never needs it.

use std::collections::BTreeMap;

use super::{key_path, node_hash, path_bit, Consistency, Direction, Leaf, Proof, Step, TREE_DEPTH};
use crate::types::Digest;

#[derive(Debug, Clone)]
pub struct StateTrie {
    /// Occupied leaves keyed by their position in the tree
    leaves: BTreeMap<Digest, Leaf>,
    /// `empty[h]` is the root of an empty subtree of height `h`
    empty: Vec<Digest>,
}

impl Default for StateTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTrie {
    pub fn new() -> Self {
        let mut empty = Vec::with_capacity(TREE_DEPTH + 1);
        empty.push(Leaf::Empty.hash());
        for h in 0..TREE_DEPTH {
            empty.push(node_hash(&empty[h], &empty[h]));
        }
        Self {
            leaves: BTreeMap::new(),
            empty,
        }
    }

    /// Insert or replace `key`, returning the previous values
    pub fn insert(&mut self, key: &[u8], values: Vec<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
        let leaf = Leaf::Occupied {
            key: key.to_vec(),
            values,
        };
        match self.leaves.insert(key_path(key), leaf) {
            Some(Leaf::Occupied { values, .. }) => Some(values),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        match self.leaves.remove(&key_path(key)) {
            Some(Leaf::Occupied { values, .. }) => Some(values),
            _ => None,
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[Vec<u8>]> {
        match self.leaves.get(&key_path(key)) {
            Some(Leaf::Occupied { values, .. }) => Some(values),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn root(&self) -> Digest {
        let entries: Vec<(&Digest, &Leaf)> = self.leaves.iter().collect();
        self.subtree(&entries, 0)
    }

    /// Build a proof for `key` (inclusion or absence) attached to `consistency`
    pub fn prove(&self, key: &[u8], consistency: Consistency) -> Proof {
        let position = key_path(key);
        let mut entries: Vec<(&Digest, &Leaf)> = self.leaves.iter().collect();
        let mut siblings = Vec::with_capacity(TREE_DEPTH);

        for depth in 0..TREE_DEPTH {
            let split = entries.partition_point(|(p, _)| !path_bit(p, depth));
            let (left, right) = entries.split_at(split);
            let bit = path_bit(&position, depth);
            let (ours, other) = if bit { (right, left) } else { (left, right) };
            siblings.push(Step {
                sibling: self.subtree(other, depth + 1),
                direction: if bit { Direction::Right } else { Direction::Left },
            });
            entries = ours.to_vec();
        }

        let leaf = entries
            .first()
            .map(|(_, leaf)| (*leaf).clone())
            .unwrap_or(Leaf::Empty);
        siblings.reverse();
        Proof {
            leaf,
            path: siblings,
            consistency,
        }
    }

    /// Root of the subtree at `depth` holding `entries`, which must be
    /// sorted and share the first `depth` path bits
    fn subtree(&self, entries: &[(&Digest, &Leaf)], depth: usize) -> Digest {
        if entries.is_empty() {
            return self.empty[TREE_DEPTH - depth];
        }
        if depth == TREE_DEPTH {
            return entries[0].1.hash();
        }
        let split = entries.partition_point(|(p, _)| !path_bit(p, depth));
        let left = self.subtree(&entries[..split], depth + 1);
        let right = self.subtree(&entries[split..], depth + 1);
        node_hash(&left, &right)
    }
}
