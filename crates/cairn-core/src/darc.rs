//! Darc: versioned access-control documents
//!
//! A Darc maps action names to [`Expr`] rules. Its id hashes only the fixed
//! fields (version, description, base id, previous id), so every new version
//! gets a new id chained to the one before it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::expression::Expr;
use crate::identity::Identity;
use crate::types::{DarcId, InstanceId};

/// Rule governing who may publish the next version
pub const RULE_EVOLVE: &str = "invoke:evolve";

/// Rule consulted when another Darc delegates to this one
pub const RULE_SIGN: &str = "_sign";

/// Contract id of instances holding a Darc
pub const CONTRACT_DARC: &str = "darc";

/// Upper bound on rules in a decoded Darc
const MAX_RULES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darc {
    version: u64,
    description: Vec<u8>,
    base_id: Option<DarcId>,
    previous_id: Option<DarcId>,
    rules: BTreeMap<String, Expr>,
}

impl Darc {
    /// Version 0 of a new Darc: `owners` may evolve it, `signers` may sign on
    /// its behalf
    pub fn genesis(owners: &[Identity], signers: &[Identity], description: &[u8]) -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(RULE_EVOLVE.to_string(), Expr::any_of(owners.iter().copied()));
        rules.insert(RULE_SIGN.to_string(), Expr::any_of(signers.iter().copied()));
        Self {
            version: 0,
            description: description.to_vec(),
            base_id: None,
            previous_id: None,
            rules,
        }
    }

    /// Content hash of the fixed fields
    pub fn id(&self) -> DarcId {
        let mut enc = Encoder::new();
        self.encode_fixed(&mut enc);
        DarcId::new(enc.digest().0)
    }

    /// Id of version 0; a genesis Darc reports its own id
    pub fn base_id(&self) -> DarcId {
        self.base_id.unwrap_or_else(|| self.id())
    }

    /// Ledger key of the instance holding this Darc
    pub fn instance_id(&self) -> InstanceId {
        InstanceId::from(self.base_id())
    }

    pub fn previous_id(&self) -> Option<DarcId> {
        self.previous_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn description(&self) -> &[u8] {
        &self.description
    }

    pub fn set_description(&mut self, description: &[u8]) {
        self.description = description.to_vec();
    }

    pub fn is_genesis(&self) -> bool {
        self.version == 0 && self.previous_id.is_none()
    }

    /// Version n+1 with the same rules, chained to this version
    pub fn next_version(&self) -> Result<Self> {
        let version = self.version.checked_add(1).ok_or_else(|| {
            Error::DarcChain(format!("Darc {} has no next version", self.base_id().short()))
        })?;
        let next = Self {
            version,
            description: self.description.clone(),
            base_id: Some(self.base_id()),
            previous_id: Some(self.id()),
            rules: self.rules.clone(),
        };
        debug!(
            base = %self.base_id().short(),
            version = next.version,
            "Prepared next Darc version"
        );
        Ok(next)
    }

    pub fn rule(&self, action: &str) -> Option<&Expr> {
        self.rules.get(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.rules.contains_key(action)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Add a rule that must not exist yet
    pub fn add_rule(&mut self, action: &str, expr: Expr) -> Result<()> {
        if self.rules.contains_key(action) {
            return Err(Error::Rule(format!("Rule {:?} already exists", action)));
        }
        self.rules.insert(action.to_string(), expr);
        Ok(())
    }

    /// Replace an existing rule
    pub fn update_rule(&mut self, action: &str, expr: Expr) -> Result<()> {
        match self.rules.get_mut(action) {
            Some(slot) => {
                *slot = expr;
                Ok(())
            }
            None => Err(Error::Rule(format!("Rule {:?} does not exist", action))),
        }
    }

    pub fn delete_rule(&mut self, action: &str) -> Result<Expr> {
        self.rules
            .remove(action)
            .ok_or_else(|| Error::Rule(format!("Rule {:?} does not exist", action)))
    }

    /// Check that `next` is a valid direct successor of this version
    pub fn check_successor(&self, next: &Darc) -> Result<()> {
        if next.previous_id != Some(self.id()) {
            return Err(Error::DarcChain(format!(
                "Version {} does not point at {}",
                next.version,
                self.id().short()
            )));
        }
        if self.version.checked_add(1) != Some(next.version) {
            return Err(Error::DarcChain(format!(
                "Version jumps from {} to {}",
                self.version, next.version
            )));
        }
        if next.base_id != Some(self.base_id()) {
            return Err(Error::DarcChain(format!(
                "Base id changed at version {}",
                next.version
            )));
        }
        Ok(())
    }

    fn encode_fixed(&self, enc: &mut Encoder) {
        enc.put_u64(self.version)
            .put_bytes(&self.description)
            .put_option(self.base_id.as_ref().map(|id| id.as_bytes().as_slice()))
            .put_option(self.previous_id.as_ref().map(|id| id.as_bytes().as_slice()));
    }

    /// Canonical encoding including the rules
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode_fixed(&mut enc);
        enc.put_u32(self.rules.len() as u32);
        for (action, expr) in &self.rules {
            enc.put_bytes(action.as_bytes());
            expr.encode(&mut enc);
        }
        enc.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let version = dec.get_u64()?;
        let description = dec.get_bytes()?.to_vec();
        let base_id = dec.get_option32()?.map(DarcId::new);
        let previous_id = dec.get_option32()?.map(DarcId::new);

        let count = dec.get_u32()? as usize;
        if count > MAX_RULES {
            return Err(Error::Encoding(format!("Too many rules: {}", count)));
        }
        let mut rules = BTreeMap::new();
        for _ in 0..count {
            let action = std::str::from_utf8(dec.get_bytes()?)
                .map_err(|e| Error::Encoding(format!("Rule name is not UTF-8: {}", e)))?
                .to_string();
            let expr = Expr::decode(&mut dec)?;
            if rules.insert(action.clone(), expr).is_some() {
                return Err(Error::Encoding(format!("Duplicate rule {:?}", action)));
            }
        }
        dec.finish()?;

        Ok(Self {
            version,
            description,
            base_id,
            previous_id,
            rules,
        })
    }
}

/// Re-derive an append-only history starting at genesis
pub fn verify_chain(versions: &[Darc]) -> Result<()> {
    let first = versions
        .first()
        .ok_or_else(|| Error::DarcChain("Empty history".to_string()))?;
    if !first.is_genesis() || first.base_id.is_some() {
        return Err(Error::DarcChain(
            "History does not start at a genesis version".to_string(),
        ));
    }
    for pair in versions.windows(2) {
        pair[0].check_successor(&pair[1])?;
    }
    Ok(())
}
