//! Error types for the Cairn core library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Darc chain error: {0}")]
    DarcChain(String),

    #[error("Rule error: {0}")]
    Rule(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid point encoding: {0}")]
    InvalidPoint(String),

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Random source unavailable: {0}")]
    Entropy(String),

    #[error("Proof rejected: {0}")]
    ProofRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Encoding(e.to_string())
    }
}

impl From<bitcode::Error> for Error {
    fn from(e: bitcode::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}
