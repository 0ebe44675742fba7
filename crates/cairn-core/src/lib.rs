//! Cairn Core - client-side trust engine for a permissioned BFT ledger
//!
//! This crate builds and signs instructions, evaluates Darc access-control
//! rules, and verifies state proofs against a trusted chain head. The
//! re-encryption side of secret management lives in `cairn-calypso`.

pub mod auth;
pub mod codec;
pub mod config;
pub mod darc;
pub mod error;
pub mod expression;
pub mod group;
pub mod identity;
pub mod instruction;
pub mod ledger;
pub mod proof;
pub mod types;

pub use auth::{check_evolution, satisfies, Authorization, DarcResolver, Evaluator, NoDelegation};
pub use config::EngineConfig;
pub use darc::{verify_chain, Darc, CONTRACT_DARC, RULE_EVOLVE, RULE_SIGN};
pub use error::{Error, Result};
pub use expression::Expr;
pub use group::{hash_to_scalar, Point, Scalar, EMBED_LEN, POINT_SIZE, SCALAR_SIZE};
pub use identity::{Identity, SignatureScheme, Signer};
pub use instruction::{Action, Argument, ClientTransaction, Instruction, ARG_DARC};
pub use ledger::{Ledger, Session, SubmitOutcome};
pub use proof::{
    BlockHeader, Consistency, Direction, InstanceState, Leaf, Proof, ProofOutcome, StateTrie, Step,
    TREE_DEPTH,
};
pub use types::{BlockId, DarcId, Digest, InstanceId, Nonce};
