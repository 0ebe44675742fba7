//! Darc authorization
//!
//! [`satisfies`] is the pure rule check over already-verified identities.
//! [`Evaluator`] does the full job for a signed request: it verifies the
//! signatures, resolves `darc:` identities through a [`DarcResolver`] with a
//! bounded depth, and reports an [`Authorization`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::darc::{Darc, RULE_EVOLVE, RULE_SIGN};
use crate::error::Result;
use crate::identity::Identity;
use crate::instruction::{Instruction, ARG_DARC};
use crate::types::DarcId;

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied(String),
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted)
    }
}

/// Whether `presented` identities, with per-identity `verified` flags,
/// satisfy the rule `action` of `darc`.
///
/// Returns false when the rule is missing or the slices differ in length.
/// Duplicates count as verified if any copy is verified.
pub fn satisfies(darc: &Darc, action: &str, presented: &[Identity], verified: &[bool]) -> bool {
    if presented.len() != verified.len() {
        return false;
    }
    let Some(expr) = darc.rule(action) else {
        return false;
    };
    let ok: HashSet<&Identity> = presented
        .iter()
        .zip(verified)
        .filter(|(_, v)| **v)
        .map(|(id, _)| id)
        .collect();
    expr.eval(&|id: &Identity| ok.contains(id))
}

/// Check that `proposed` may replace `current` as the next version.
///
/// Whether the evolution is signed correctly is a separate rule check.
pub fn check_evolution(current: &Darc, proposed: &Darc) -> Result<()> {
    current.check_successor(proposed)
}

/// Source of the current version of a Darc, by base id
pub trait DarcResolver {
    fn resolve(&self, id: &DarcId) -> Result<Option<Darc>>;
}

impl<R: DarcResolver + ?Sized> DarcResolver for &R {
    fn resolve(&self, id: &DarcId) -> Result<Option<Darc>> {
        (**self).resolve(id)
    }
}

impl DarcResolver for HashMap<DarcId, Darc> {
    fn resolve(&self, id: &DarcId) -> Result<Option<Darc>> {
        Ok(self.get(id).cloned())
    }
}

/// Resolver for requests that must not follow any delegation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelegation;

impl DarcResolver for NoDelegation {
    fn resolve(&self, _id: &DarcId) -> Result<Option<Darc>> {
        Ok(None)
    }
}

pub struct Evaluator<R> {
    resolver: R,
    max_depth: usize,
}

impl<R: DarcResolver> Evaluator<R> {
    pub fn new(resolver: R, config: &EngineConfig) -> Self {
        Self::with_max_depth(resolver, config.max_delegation_depth)
    }

    pub fn with_max_depth(resolver: R, max_depth: usize) -> Self {
        Self {
            resolver,
            max_depth,
        }
    }

    /// Check `signatures` over `message` against rule `action` of `darc`.
    ///
    /// Resolver failures are returned as errors; a missing or too deeply
    /// nested delegated Darc counts as unverified.
    #[instrument(skip_all, fields(darc = %darc.id().short(), action = action))]
    pub fn authorize(
        &self,
        darc: &Darc,
        action: &str,
        message: &[u8],
        signatures: &[(Identity, Vec<u8>)],
    ) -> Result<Authorization> {
        if !darc.contains(action) {
            debug!("No such rule");
            return Ok(Authorization::Denied(format!("No rule {:?}", action)));
        }

        let mut presented = Vec::with_capacity(signatures.len());
        let mut flags = Vec::with_capacity(signatures.len());
        for (identity, signature) in signatures {
            presented.push(*identity);
            flags.push(identity.verify(message, signature));
        }
        let keys: Vec<Identity> = presented
            .iter()
            .zip(&flags)
            .filter(|(_, ok)| **ok)
            .map(|(id, _)| *id)
            .collect();
        debug!(
            signatures = signatures.len(),
            verified = keys.len(),
            "Verified signatures"
        );

        let mut walk = Walk {
            keys: &keys,
            seen: HashMap::new(),
        };
        if self.check(darc, action, presented, flags, 0, &mut walk)? {
            Ok(Authorization::Granted)
        } else {
            Ok(Authorization::Denied(format!(
                "Signatures do not satisfy {:?}",
                action
            )))
        }
    }

    /// Authorize a signed instruction against its governing Darc.
    ///
    /// An evolve instruction carrying a new Darc version must also chain onto
    /// `darc`; a stale predecessor is a [`crate::Error::DarcChain`] error.
    pub fn authorize_instruction(&self, instruction: &Instruction, darc: &Darc) -> Result<Authorization> {
        let action = instruction.action.rule_name();
        if action == RULE_EVOLVE {
            if let Some(bytes) = instruction.action.arg(ARG_DARC) {
                let proposed = Darc::from_bytes(bytes)?;
                check_evolution(darc, &proposed)?;
            }
        }
        let hash = instruction.hash();
        self.authorize(darc, &action, hash.as_bytes(), &instruction.signatures)
    }

    fn check(
        &self,
        darc: &Darc,
        action: &str,
        mut presented: Vec<Identity>,
        mut flags: Vec<bool>,
        depth: usize,
        walk: &mut Walk<'_>,
    ) -> Result<bool> {
        let Some(expr) = darc.rule(action) else {
            return Ok(false);
        };
        for leaf in expr.identities() {
            if let Identity::Darc(id) = leaf {
                if presented.contains(leaf) {
                    continue;
                }
                let ok = self.delegated(id, depth + 1, walk)?;
                presented.push(*leaf);
                flags.push(ok);
            }
        }
        Ok(satisfies(darc, action, &presented, &flags))
    }

    /// Each Darc is resolved at most once per request. A Darc still being
    /// resolved further up the chain counts as unverified.
    fn delegated(
        &self,
        id: &DarcId,
        depth: usize,
        walk: &mut Walk<'_>,
    ) -> Result<bool> {
        match walk.seen.get(id) {
            Some(Resolution::Done(ok)) => return Ok(*ok),
            Some(Resolution::Pending) => {
                debug!(darc = %id.short(), "Delegation cycle");
                return Ok(false);
            }
            None => {}
        }
        if depth > self.max_depth {
            warn!(darc = %id.short(), depth, "Delegation depth exceeded");
            return Ok(false);
        }
        walk.seen.insert(*id, Resolution::Pending);
        let ok = match self.resolver.resolve(id)? {
            Some(delegate) => {
                let flags = vec![true; walk.keys.len()];
                let keys = walk.keys.to_vec();
                self.check(&delegate, RULE_SIGN, keys, flags, depth, walk)?
            }
            None => {
                debug!(darc = %id.short(), "Delegated Darc not found");
                false
            }
        };
        walk.seen.insert(*id, Resolution::Done(ok));
        Ok(ok)
    }
}

#[derive(Debug, Clone, Copy)]
enum Resolution {
    Pending,
    Done(bool),
}

/// Per-request delegation state: the verified signer keys and every Darc
/// looked at so far
struct Walk<'a> {
    keys: &'a [Identity],
    seen: HashMap<DarcId, Resolution>,
}
