//! Persistence behind the transaction state cache.
//!
//! The cache owns all state in memory and hands the full record of an
//! account to a [`CacheStore`] after every successful mutation. Stores never
//! interpret records.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kin_memo::InvoiceList;
use kin_solana::PublicKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{Account, TransactionHistory};

/// Everything persisted for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub public_key: PublicKey,
    pub account: Option<Account>,
    pub history: TransactionHistory,
    pub invoices: Vec<InvoiceList>,
}

impl AccountRecord {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            ..Default::default()
        }
    }
}

pub trait CacheStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<AccountRecord>, StoreError>;
    fn persist(&self, record: &AccountRecord) -> Result<(), StoreError>;
    fn remove(&self, public_key: &PublicKey) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps records in a map. Used when the cache does not need to survive a
/// restart, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<PublicKey, AccountRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<AccountRecord>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn persist(&self, record: &AccountRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.public_key, record.clone());
        Ok(())
    }

    fn remove(&self, public_key: &PublicKey) -> Result<(), StoreError> {
        self.records.lock().remove(public_key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

const ACCOUNT_INFO_FILE: &str = "account_info.json";
const TRANSACTIONS_FILE: &str = "transactions.json";
const INVOICES_FILE: &str = "invoices.json";

/// JSON files per account under
/// `<root>/kin_storage/env/<network>/kin_accounts/<account>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    accounts_dir: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>, network: &str) -> Self {
        Self {
            accounts_dir: root
                .as_ref()
                .join("kin_storage")
                .join("env")
                .join(network)
                .join("kin_accounts"),
        }
    }

    pub fn accounts_dir(&self) -> &Path {
        &self.accounts_dir
    }

    fn account_dir(&self, public_key: &PublicKey) -> PathBuf {
        self.accounts_dir.join(public_key.to_base58())
    }

    fn load_account(&self, public_key: PublicKey, dir: &Path) -> Result<AccountRecord, StoreError> {
        Ok(AccountRecord {
            public_key,
            account: read_json(&dir.join(ACCOUNT_INFO_FILE))?,
            history: read_json(&dir.join(TRANSACTIONS_FILE))?.unwrap_or_default(),
            invoices: read_json(&dir.join(INVOICES_FILE))?.unwrap_or_default(),
        })
    }
}

impl CacheStore for FileStore {
    fn load_all(&self) -> Result<Vec<AccountRecord>, StoreError> {
        let entries = match fs::read_dir(&self.accounts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(public_key) = name.to_str().and_then(|n| n.parse::<PublicKey>().ok()) else {
                warn!(dir = ?entry.path(), "skipping directory that is not an account");
                continue;
            };
            records.push(self.load_account(public_key, &entry.path())?);
        }

        debug!(accounts = records.len(), dir = ?self.accounts_dir, "loaded cache from disk");
        Ok(records)
    }

    fn persist(&self, record: &AccountRecord) -> Result<(), StoreError> {
        let dir = self.account_dir(&record.public_key);
        fs::create_dir_all(&dir)?;

        match &record.account {
            Some(account) => write_json(&dir.join(ACCOUNT_INFO_FILE), account)?,
            None => remove_if_present(&dir.join(ACCOUNT_INFO_FILE))?,
        }
        write_json(&dir.join(TRANSACTIONS_FILE), &record.history)?;
        write_json(&dir.join(INVOICES_FILE), &record.invoices)?;
        Ok(())
    }

    fn remove(&self, public_key: &PublicKey) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.account_dir(public_key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.accounts_dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a sibling temp file so a crash never leaves half a file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
