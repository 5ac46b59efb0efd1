//! Local transaction state for the Kin SDK.
//!
//! [`TransactionStateCache`] is the single owner of cached accounts and
//! transactions. Callers only ever receive copies. Durability is delegated
//! to a [`CacheStore`]: [`MemoryStore`] for ephemeral use and [`FileStore`]
//! for JSON files on disk.

pub mod cache;
pub mod error;
pub mod store;
pub mod types;

pub use cache::{MergeOutcome, TransactionStateCache};
pub use error::{CacheError, StoreError};
pub use store::{AccountRecord, CacheStore, FileStore, MemoryStore};
pub use types::{
    Account, AccountStatus, Balance, PagingToken, StoredTransaction, TransactionHistory,
    TransactionPage, TransactionStatus,
};
