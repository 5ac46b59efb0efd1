//! Local view of accounts and their transactions.
//!
//! Every tracked transaction moves through
//! `Unknown -> Inflight -> Acknowledged -> Historical` and never backwards.
//! The submission path and the history-polling path may run on different
//! threads; each operation below runs start to finish under one lock, and is
//! persisted to the [`CacheStore`] before it becomes visible.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use kin_memo::{foreign_key, BinaryMemo, InvoiceList, FOREIGN_KEY_LEN};
use kin_solana::{transaction_id, Instruction, PublicKey, TransactionId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::store::{AccountRecord, CacheStore, MemoryStore};
use crate::types::{
    Account, AccountStatus, PagingToken, StoredTransaction, TransactionHistory, TransactionPage,
    TransactionStatus,
};

/// Counts of what a history merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub upgraded: usize,
    pub duplicates: usize,
}

impl std::ops::AddAssign for MergeOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.upgraded += other.upgraded;
        self.duplicates += other.duplicates;
    }
}

pub struct TransactionStateCache {
    records: Mutex<HashMap<PublicKey, AccountRecord>>,
    store: Box<dyn CacheStore>,
}

impl std::fmt::Debug for TransactionStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStateCache")
            .field("accounts", &self.records.lock().len())
            .finish()
    }
}

impl Default for TransactionStateCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TransactionStateCache {
    /// An empty cache backed by `store`. Existing records in the store are
    /// not read; use [`load`](Self::load) for that.
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            store: Box::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Rebuild a cache from everything `store` holds.
    pub fn load(store: impl CacheStore + 'static) -> Result<Self, CacheError> {
        let records: HashMap<PublicKey, AccountRecord> = store
            .load_all()?
            .into_iter()
            .map(|record| (record.public_key, record))
            .collect();
        info!(accounts = records.len(), "transaction cache loaded");
        Ok(Self {
            records: Mutex::new(records),
            store: Box::new(store),
        })
    }

    /// Run `f` against a copy of the account's record, persist the result and
    /// only then commit it. An error from `f` or the store leaves the cache
    /// untouched.
    fn mutate<T>(
        &self,
        public_key: &PublicKey,
        f: impl FnOnce(&mut AccountRecord) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut records = self.records.lock();
        let mut record = records
            .get(public_key)
            .cloned()
            .unwrap_or_else(|| AccountRecord::new(*public_key));
        let out = f(&mut record)?;
        self.store.persist(&record)?;
        records.insert(*public_key, record);
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Submission path
    // -----------------------------------------------------------------------

    /// Track a transaction the caller is about to submit, as `Inflight`.
    pub fn upsert_submitted(
        &self,
        account: &PublicKey,
        envelope: Vec<u8>,
    ) -> Result<StoredTransaction, CacheError> {
        let tx = StoredTransaction::inflight(envelope, now_ms())?;
        self.mutate(account, |record| {
            if let Some(existing) = record.history.items.iter().find(|t| t.id == tx.id) {
                debug!(id = %tx.id, status = ?existing.status, "submission already tracked");
                return Err(CacheError::AlreadyExists(tx.id));
            }
            record.history.items.insert(0, tx.clone());
            info!(%account, id = %tx.id, "transaction inflight");
            Ok(tx)
        })
    }

    /// Record the network's acceptance of an inflight transaction.
    pub fn apply_submission_result(
        &self,
        account: &PublicKey,
        id: &TransactionId,
        result_bytes: Vec<u8>,
    ) -> Result<StoredTransaction, CacheError> {
        self.mutate(account, |record| {
            let tx = find_mut(record, id)?;
            advance(tx, TransactionStatus::Acknowledged)?;
            tx.result_bytes = Some(result_bytes);
            info!(%account, %id, "transaction acknowledged");
            Ok(tx.clone())
        })
    }

    /// Forget an inflight transaction whose submission never reached the
    /// network.
    pub fn abandon_submission(
        &self,
        account: &PublicKey,
        id: &TransactionId,
    ) -> Result<(), CacheError> {
        self.mutate(account, |record| {
            let tx = find_mut(record, id)?;
            if tx.status != TransactionStatus::Inflight {
                return Err(CacheError::Regression {
                    id: *id,
                    from: tx.status,
                    to: TransactionStatus::Unknown,
                });
            }
            record.history.items.retain(|t| t.id != *id);
            warn!(%account, %id, "inflight transaction abandoned");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // History path
    // -----------------------------------------------------------------------

    /// Merge a page of server history.
    ///
    /// Records already tracked as pending are upgraded to `Historical` with
    /// the server's paging token. Records already historical are dropped,
    /// so overlapping pages are deduplicated by transaction id.
    pub fn merge_history_page(
        &self,
        account: &PublicKey,
        page: TransactionPage,
    ) -> Result<MergeOutcome, CacheError> {
        for item in &page.items {
            validate_history_item(item)?;
        }

        self.mutate(account, |record| {
            let mut outcome = MergeOutcome::default();
            let history = &mut record.history;

            for item in page.items {
                match history.items.iter_mut().find(|t| t.id == item.id) {
                    Some(existing) if existing.status == TransactionStatus::Historical => {
                        outcome.duplicates += 1;
                    }
                    Some(existing) => {
                        debug!(id = %item.id, from = ?existing.status, "upgrading to historical");
                        let mut upgraded = item;
                        if upgraded.result_bytes.is_none() {
                            upgraded.result_bytes = existing.result_bytes.take();
                        }
                        *existing = upgraded;
                        outcome.upgraded += 1;
                    }
                    None => {
                        history.items.push(item);
                        outcome.inserted += 1;
                    }
                }
            }

            // Pending first (stable), then historical by token, newest first.
            history.items.sort_by(|a, b| match (a.is_pending(), b.is_pending()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                (false, false) => b.paging_token.cmp(&a.paging_token),
            });

            let tokens = history
                .items
                .iter()
                .filter_map(|t| t.paging_token.as_ref())
                .chain(page.head_paging_token.as_ref())
                .chain(page.tail_paging_token.as_ref())
                .chain(history.head_paging_token.as_ref())
                .chain(history.tail_paging_token.as_ref());
            let (head, tail) = token_bounds(tokens);
            history.head_paging_token = head;
            history.tail_paging_token = tail;

            info!(
                %account,
                inserted = outcome.inserted,
                upgraded = outcome.upgraded,
                duplicates = outcome.duplicates,
                "history page merged"
            );
            Ok(outcome)
        })
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Point-in-time copy of an account with its pending balance computed
    /// from inflight outgoing transfers.
    pub fn account_snapshot(&self, public_key: &PublicKey) -> Result<Account, CacheError> {
        let records = self.records.lock();
        let record = records
            .get(public_key)
            .ok_or(CacheError::AccountNotFound(*public_key))?;
        let mut account = record
            .account
            .clone()
            .ok_or(CacheError::AccountNotFound(*public_key))?;

        let inflight: u64 = record
            .history
            .items
            .iter()
            .filter(|t| t.status == TransactionStatus::Inflight)
            .map(|t| t.outgoing_quarks(&account))
            .fold(0, u64::saturating_add);
        account.balance.pending_quarks = account.balance.quarks.saturating_sub(inflight);
        Ok(account)
    }

    /// Insert or refresh an account. A private key held locally survives an
    /// update that lacks one, and the sequence number never goes down.
    pub fn upsert_account(&self, account: Account) -> Result<Account, CacheError> {
        let public_key = account.public_key;
        self.mutate(&public_key, |record| {
            let mut merged = account;
            if let Some(existing) = &record.account {
                if merged.private_key.is_none() {
                    merged.private_key = existing.private_key.clone();
                }
                merged.sequence = merged.sequence.max(existing.sequence);
            }
            debug!(account = %public_key, status = ?merged.status, "account updated");
            record.account = Some(merged.clone());
            Ok(merged)
        })
    }

    pub fn update_balance(&self, public_key: &PublicKey, quarks: u64) -> Result<Account, CacheError> {
        self.mutate(public_key, |record| {
            let account = record
                .account
                .as_mut()
                .ok_or(CacheError::AccountNotFound(*public_key))?;
            account.balance.quarks = quarks;
            account.balance.pending_quarks = quarks;
            Ok(account.clone())
        })
    }

    /// Bump and return the sequence number of a registered account.
    pub fn advance_sequence(&self, public_key: &PublicKey) -> Result<u64, CacheError> {
        self.mutate(public_key, |record| {
            let account = record
                .account
                .as_mut()
                .ok_or(CacheError::AccountNotFound(*public_key))?;
            if account.status != AccountStatus::Registered {
                return Err(CacheError::Unregistered(*public_key));
            }
            account.sequence = account
                .sequence
                .checked_add(1)
                .ok_or(CacheError::SequenceExhausted(*public_key))?;
            Ok(account.sequence)
        })
    }

    pub fn remove_account(&self, public_key: &PublicKey) -> Result<(), CacheError> {
        let mut records = self.records.lock();
        self.store.remove(public_key)?;
        records.remove(public_key);
        info!(account = %public_key, "account removed from cache");
        Ok(())
    }

    /// Accounts with a cached account record, in key order.
    pub fn account_ids(&self) -> Vec<PublicKey> {
        let records = self.records.lock();
        let mut ids: Vec<PublicKey> = records
            .values()
            .filter(|r| r.account.is_some())
            .map(|r| r.public_key)
            .collect();
        ids.sort();
        ids
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn transactions(&self, public_key: &PublicKey) -> Option<TransactionHistory> {
        self.records
            .lock()
            .get(public_key)
            .map(|r| r.history.clone())
    }

    pub fn transaction(&self, public_key: &PublicKey, id: &TransactionId) -> Option<StoredTransaction> {
        self.records
            .lock()
            .get(public_key)
            .and_then(|r| r.history.items.iter().find(|t| t.id == *id).cloned())
    }

    /// `Unknown` for transactions the cache has never seen.
    pub fn transaction_status(&self, public_key: &PublicKey, id: &TransactionId) -> TransactionStatus {
        self.transaction(public_key, id)
            .map(|t| t.status)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Invoices
    // -----------------------------------------------------------------------

    /// Remember invoice lists so they can be matched back to transactions by
    /// memo foreign key. Lists already known are ignored.
    pub fn add_invoice_lists(
        &self,
        public_key: &PublicKey,
        lists: Vec<InvoiceList>,
    ) -> Result<(), CacheError> {
        self.mutate(public_key, |record| {
            for list in lists {
                let key = foreign_key(&list);
                if !record.invoices.iter().any(|known| foreign_key(known) == key) {
                    record.invoices.push(list);
                }
            }
            Ok(())
        })
    }

    /// The invoice list referenced by the first binary memo of a transaction.
    pub fn invoice_list_for_transaction(
        &self,
        public_key: &PublicKey,
        id: &TransactionId,
    ) -> Option<InvoiceList> {
        let records = self.records.lock();
        let record = records.get(public_key)?;
        let tx = record.history.items.iter().find(|t| t.id == *id)?;
        let key = memo_foreign_key(tx)?;
        record
            .invoices
            .iter()
            .find(|list| foreign_key(list) == key)
            .cloned()
    }

    /// Drop everything, in memory and in the store.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut records = self.records.lock();
        self.store.clear()?;
        records.clear();
        info!("transaction cache cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_mut<'a>(
    record: &'a mut AccountRecord,
    id: &TransactionId,
) -> Result<&'a mut StoredTransaction, CacheError> {
    record
        .history
        .items
        .iter_mut()
        .find(|t| t.id == *id)
        .ok_or(CacheError::NotFound(*id))
}

/// Move `tx` to `to`, refusing anything that is not strictly forward.
fn advance(tx: &mut StoredTransaction, to: TransactionStatus) -> Result<(), CacheError> {
    if tx.status >= to {
        warn!(id = %tx.id, from = ?tx.status, to = ?to, "rejected status regression");
        return Err(CacheError::Regression {
            id: tx.id,
            from: tx.status,
            to,
        });
    }
    tx.status = to;
    Ok(())
}

fn validate_history_item(item: &StoredTransaction) -> Result<(), CacheError> {
    if item.status != TransactionStatus::Historical {
        return Err(CacheError::InvalidRecord(format!(
            "{} has status {:?}, expected Historical",
            item.id, item.status
        )));
    }
    if item.paging_token.is_none() {
        return Err(CacheError::InvalidRecord(format!(
            "{} has no paging token",
            item.id
        )));
    }
    if transaction_id(&item.envelope)? != item.id {
        return Err(CacheError::InvalidRecord(format!(
            "{} does not match its envelope",
            item.id
        )));
    }
    Ok(())
}

fn token_bounds<'a>(
    tokens: impl Iterator<Item = &'a PagingToken>,
) -> (Option<PagingToken>, Option<PagingToken>) {
    let mut head: Option<&PagingToken> = None;
    let mut tail: Option<&PagingToken> = None;
    for token in tokens {
        if head.map_or(true, |h| token > h) {
            head = Some(token);
        }
        if tail.map_or(true, |t| token < t) {
            tail = Some(token);
        }
    }
    (head.cloned(), tail.cloned())
}

fn memo_foreign_key(tx: &StoredTransaction) -> Option<[u8; FOREIGN_KEY_LEN]> {
    tx.instructions().ok()?.iter().find_map(|ix| match ix {
        Instruction::Memo(memo) => BinaryMemo::from_instruction_data(&memo.data)
            .or_else(|e| e.into_lenient().ok_or(()))
            .ok()
            .filter(BinaryMemo::has_foreign_key)
            .map(|m| *m.foreign_key()),
        _ => None,
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
