//! Reference secret-management quorum
//!
//! The long-term secret `x` is Shamir-shared among `n` members with threshold
//! `t`. Each member answers a read with `s_i·(U + Xc)`; any `t` answers are
//! combined by Lagrange interpolation in the exponent into `x·(U + Xc)`
//! without reconstructing `x`.

use std::collections::HashSet;

use cairn_core::{
    BlockId, EngineConfig, InstanceId, InstanceState, Point, Proof, ProofOutcome, Scalar,
};
use rand::{CryptoRng, RngCore};
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CalypsoError, Result};
use crate::flow::SecretManager;
use crate::read::{DecryptKeyReply, Read, CONTRACT_READ};
use crate::write::{Write, CONTRACT_WRITE};

/// One member's share `f(index)` of the long-term secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretShare {
    #[zeroize(skip)]
    pub index: u32,
    pub secret: Scalar,
}

impl std::fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretShare")
            .field("index", &self.index)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A member's answer to a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReencryptedShare {
    pub index: u32,
    pub point: Point,
}

/// Apply one share to `U + Xc`
pub fn reencrypt_share(share: &SecretShare, u: &Point, xc: &Point) -> ReencryptedShare {
    ReencryptedShare {
        index: share.index,
        point: (*u + *xc) * share.secret,
    }
}

/// Combine `threshold` re-encrypted shares into `x·(U + Xc)`
pub fn combine(shares: &[ReencryptedShare], threshold: usize) -> Result<Point> {
    if threshold == 0 {
        return Err(CalypsoError::InvalidThreshold {
            threshold,
            participants: shares.len(),
        });
    }
    if shares.len() < threshold {
        return Err(CalypsoError::NotEnoughShares {
            needed: threshold,
            got: shares.len(),
        });
    }
    let used = &shares[..threshold];
    let mut seen = HashSet::new();
    for share in used {
        if share.index == 0 || !seen.insert(share.index) {
            return Err(CalypsoError::ShareMismatch(format!(
                "Share index {} is zero or repeated",
                share.index
            )));
        }
    }

    let mut acc = Point::identity();
    for (i, share_i) in used.iter().enumerate() {
        let xi = Scalar::from_u64(u64::from(share_i.index));
        let mut basis = Scalar::one();
        for (j, share_j) in used.iter().enumerate() {
            if i == j {
                continue;
            }
            // L_i(0) = prod x_j / (x_j - x_i)
            let xj = Scalar::from_u64(u64::from(share_j.index));
            let inv = (xj - xi).invert().ok_or_else(|| {
                CalypsoError::ShareMismatch("Indices collide in the field".to_string())
            })?;
            basis = basis * xj * inv;
        }
        acc = acc + share_i.point * basis;
    }
    Ok(acc)
}

/// Dealt long-term secret held by the quorum
pub struct LongTermSecret {
    id: InstanceId,
    threshold: usize,
    public: Point,
    shares: Vec<SecretShare>,
}

impl LongTermSecret {
    /// Deal a fresh secret to `participants` members, any `threshold` of
    /// which can answer reads
    pub fn deal<R: RngCore + CryptoRng>(
        id: InstanceId,
        participants: usize,
        threshold: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if threshold == 0 || threshold > participants || participants > u32::MAX as usize {
            return Err(CalypsoError::InvalidThreshold {
                threshold,
                participants,
            });
        }

        let mut coefficients: Vec<Scalar> = (0..threshold).map(|_| Scalar::random(rng)).collect();
        let public = Point::mul_base(&coefficients[0]);

        let shares = (1..=participants as u32)
            .map(|index| {
                let x = Scalar::from_u64(u64::from(index));
                // Horner
                let secret = coefficients
                    .iter()
                    .rev()
                    .fold(Scalar::zero(), |acc, c| acc * x + *c);
                SecretShare { index, secret }
            })
            .collect();
        coefficients.zeroize();

        debug!(participants, threshold, id = %id.short(), "Dealt long-term secret");
        Ok(Self {
            id,
            threshold,
            public,
            shares,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn public_key(&self) -> Point {
        self.public
    }

    pub fn shares(&self) -> &[SecretShare] {
        &self.shares
    }

    /// Answer an authorized read of `write`, governed by the Darc `write_darc`
    #[instrument(skip_all, fields(lts = %self.id.short()))]
    pub fn reencrypt(
        &self,
        write: &Write,
        read: &Read,
        write_darc: &cairn_core::DarcId,
    ) -> Result<DecryptKeyReply> {
        if write.lts_id != self.id {
            return Err(CalypsoError::Key(format!(
                "Write is for long-term secret {}, not {}",
                write.lts_id.short(),
                self.id.short()
            )));
        }
        read.validate()?;
        write.check_proof(write_darc)?;

        let answers: Vec<ReencryptedShare> = self
            .shares
            .iter()
            .take(self.threshold)
            .map(|share| reencrypt_share(share, &write.u, &read.xc))
            .collect();
        let xhat_enc = combine(&answers, self.threshold)?;

        Ok(DecryptKeyReply {
            cs: write.cs.clone(),
            xhat_enc,
            x: self.public,
        })
    }
}

impl std::fmt::Debug for LongTermSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongTermSecret")
            .field("id", &self.id)
            .field("threshold", &self.threshold)
            .field("participants", &self.shares.len())
            .field("public", &self.public)
            .finish()
    }
}

/// Quorum that only answers reads proven on chain up to its trusted head
#[derive(Debug)]
pub struct Quorum {
    lts: LongTermSecret,
    trusted_head: BlockId,
    config: EngineConfig,
}

impl Quorum {
    /// Proofs may chain through at most `config.max_chain_links` headers
    pub fn new(lts: LongTermSecret, trusted_head: BlockId, config: EngineConfig) -> Self {
        Self {
            lts,
            trusted_head,
            config,
        }
    }

    pub fn lts(&self) -> &LongTermSecret {
        &self.lts
    }

    pub fn set_trusted_head(&mut self, head: BlockId) {
        self.trusted_head = head;
    }

    fn committed(&self, proof: &Proof, contract: &str) -> Result<(InstanceId, InstanceState)> {
        let key = proof
            .key()
            .ok_or_else(|| CalypsoError::InvalidState("Proof shows no instance".to_string()))?;
        let id = InstanceId::from_slice(key)
            .ok_or_else(|| CalypsoError::InvalidState(format!("Key has {} bytes", key.len())))?;
        let outcome = proof.verify_bounded(key, &self.trusted_head, self.config.max_chain_links);
        if let ProofOutcome::Invalid(reason) = &outcome {
            warn!(instance = %id.short(), reason = %reason, "Rejected proof");
        }
        let state = outcome
            .into_instance()?
            .ok_or_else(|| CalypsoError::InvalidState(format!("Instance {} absent", id.short())))?;
        if state.contract_id != contract {
            return Err(CalypsoError::InvalidState(format!(
                "Instance {} is a {:?}, expected {:?}",
                id.short(),
                state.contract_id,
                contract
            )));
        }
        Ok((id, state))
    }
}

impl SecretManager for Quorum {
    fn request_reencryption(
        &self,
        read: &Read,
        write_proof: &Proof,
        read_proof: &Proof,
    ) -> Result<DecryptKeyReply> {
        let (write_id, write_state) = self.committed(write_proof, CONTRACT_WRITE)?;
        let (_, read_state) = self.committed(read_proof, CONTRACT_READ)?;

        let committed_read = Read::from_bytes(&read_state.state)?;
        if committed_read != *read {
            return Err(CalypsoError::InvalidState(
                "Request differs from the committed read".to_string(),
            ));
        }
        if read.write != write_id {
            return Err(CalypsoError::InvalidState(format!(
                "Read targets {}, proof shows {}",
                read.write.short(),
                write_id.short()
            )));
        }

        let write = Write::from_bytes(&write_state.state)?;
        self.lts.reencrypt(&write, read, &write_state.darc_id)
    }
}
