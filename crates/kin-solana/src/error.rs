use thiserror::Error;

/// Failures building, signing or parsing Kin ledger transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolError {
    #[error("bad ed25519 seed: {0}")]
    InvalidPrivateKey(String),

    #[error("not a kin account address: {0}")]
    InvalidAddress(String),

    #[error("cannot build transaction: {0}")]
    TransactionBuildError(String),

    #[error("cannot sign transaction: {0}")]
    SigningError(String),

    /// Wire bytes that do not parse as a legacy transaction.
    #[error("malformed transaction envelope: {0}")]
    MalformedTransaction(String),
}
