//! Contract of the network collaborator.
//!
//! The SDK never talks to the network itself. An application plugs in a
//! [`TransactionTransport`] (gRPC, HTTP or a test double) that submits
//! signed transactions and pages through account history.

use kin_solana::PublicKey;
use kin_storage::{PagingToken, TransactionPage};
use thiserror::Error;

/// Outcome of a submission that reached the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Success { result_bytes: Vec<u8> },
    Rejected { reason: String },
}

/// The request did not complete. Nothing is known about the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error: {0}")]
    Server(String),
}

/// Which side of a paging token a history request reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HistoryDirection {
    /// Transactions after the cursor, starting with the one next to it.
    #[default]
    Newer,
    /// Transactions before the cursor, starting with the one next to it.
    Older,
}

pub trait TransactionTransport: Send + Sync {
    fn submit_transaction(&self, envelope: &[u8]) -> Result<SubmissionResult, TransportError>;

    /// One page of historical transactions of `account` on the `direction`
    /// side of `cursor`. Without a cursor the server returns its newest page.
    /// Pages may be size-limited but never skip a transaction between the
    /// cursor and the far end of the page. Every item must be `Historical`
    /// and carry a paging token.
    fn get_history(
        &self,
        account: &PublicKey,
        cursor: Option<&PagingToken>,
        direction: HistoryDirection,
    ) -> Result<TransactionPage, TransportError>;
}
