//! Client-side Kin SDK.
//!
//! [`KinClient`] builds Kin payments, binds them to invoices through a
//! binary memo, signs them with a [`TransactionSigner`], submits them
//! through an application-supplied [`TransactionTransport`] and tracks
//! their state in a [`TransactionStateCache`].
//!
//! No logging subscriber is installed; the crates emit `tracing` events
//! and the application decides where they go.

pub mod client;
pub mod config;
pub mod error;
pub mod signer;
pub mod transport;

pub use client::{KinClient, Payment, PaymentTransaction};
pub use config::{KinNetwork, SdkConfig, MAINNET_KIN_MINT, TESTNET_KIN_MINT};
pub use error::SdkError;
pub use signer::{sign_with, LocalSigner, TransactionSigner};
pub use transport::{HistoryDirection, SubmissionResult, TransactionTransport, TransportError};

pub use kin_memo::{
    build_memo, resolve_and_validate, BinaryMemo, BoundRegion, Invoice, InvoiceList, LineItem,
    TransferType,
};
pub use kin_solana::{PrivateKey, PublicKey, TransactionId};
pub use kin_storage::{
    Account, AccountStatus, Balance, CacheError, MergeOutcome, PagingToken, StoredTransaction,
    TransactionHistory, TransactionPage, TransactionStateCache, TransactionStatus,
};
