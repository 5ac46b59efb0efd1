use kin_solana::{PublicKey, SolError, TransactionId};
use thiserror::Error;

use crate::types::TransactionStatus;

/// Failures of a [`CacheStore`](crate::store::CacheStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conflicts raised by the transaction state cache.
///
/// Apart from `Storage`, these mean the caller's view of the cache is stale
/// and can be retried after re-reading it.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("transaction {0} is already tracked")]
    AlreadyExists(TransactionId),

    #[error("transaction {0} is not tracked")]
    NotFound(TransactionId),

    #[error("account {0} is not cached")]
    AccountNotFound(PublicKey),

    #[error("transaction {id} cannot move from {from:?} to {to:?}")]
    Regression {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("invalid history record: {0}")]
    InvalidRecord(String),

    #[error("invalid transaction envelope: {0}")]
    InvalidEnvelope(#[from] SolError),

    #[error("account {0} is not registered")]
    Unregistered(PublicKey),

    #[error("sequence number of account {0} is exhausted")]
    SequenceExhausted(PublicKey),

    #[error(transparent)]
    Storage(#[from] StoreError),
}
