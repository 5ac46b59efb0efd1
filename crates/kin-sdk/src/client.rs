//! Payment client: build, bind, sign, submit and track.

use kin_memo::{
    foreign_key, resolve_and_validate, BinaryMemo, Invoice, InvoiceList, TransferType,
    FOREIGN_KEY_LEN,
};
use kin_solana::{
    classify_all, compile_transaction, derive_associated_token_address, memo_instruction,
    token_transfer, PublicKey, SolInstruction, Transaction, TransactionId,
};
use kin_storage::{
    Account, CacheError, MergeOutcome, PagingToken, StoredTransaction, TransactionHistory,
    TransactionStateCache, TransactionStatus,
};
use tracing::{debug, info, warn};

use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::signer::{sign_with, TransactionSigner};
use crate::transport::{HistoryDirection, SubmissionResult, TransactionTransport};

/// One transfer of a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Token account receiving the quarks.
    pub destination: PublicKey,
    pub amount: u64,
    pub invoice: Option<Invoice>,
}

impl Payment {
    pub fn new(destination: PublicKey, amount: u64) -> Self {
        Self {
            destination,
            amount,
            invoice: None,
        }
    }

    pub fn with_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(invoice);
        self
    }
}

/// A signed payment ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub envelope: Vec<u8>,
    pub invoices: Option<InvoiceList>,
}

pub struct KinClient<T> {
    config: SdkConfig,
    transport: T,
    cache: TransactionStateCache,
}

impl<T: TransactionTransport> KinClient<T> {
    /// Build a client whose cache is opened from `config`.
    pub fn new(config: SdkConfig, transport: T) -> Result<Self, SdkError> {
        config.validate()?;
        let cache = config.open_cache()?;
        Ok(Self::with_cache(config, transport, cache))
    }

    pub fn with_cache(config: SdkConfig, transport: T, cache: TransactionStateCache) -> Self {
        Self {
            config,
            transport,
            cache,
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn cache(&self) -> &TransactionStateCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub fn add_account(&self, account: Account) -> Result<Account, SdkError> {
        Ok(self.cache.upsert_account(account)?)
    }

    /// Snapshot of a cached account with its pending balance.
    pub fn account(&self, public_key: &PublicKey) -> Result<Account, SdkError> {
        Ok(self.cache.account_snapshot(public_key)?)
    }

    pub fn history(&self, public_key: &PublicKey) -> Option<TransactionHistory> {
        self.cache.transactions(public_key)
    }

    /// The Kin token account `owner` holds on the configured network.
    pub fn token_account(&self, owner: &PublicKey) -> Result<PublicKey, SdkError> {
        Ok(derive_associated_token_address(
            owner,
            &self.config.network.mint(),
        )?)
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Build and sign a payment from `source` (a token account owned by
    /// `signer`), anchored by one binary memo.
    ///
    /// Either every payment carries an invoice or none does. The memo is
    /// checked against the invoices before signing.
    pub fn build_payment_transaction(
        &self,
        signer: &dyn TransactionSigner,
        source: &PublicKey,
        payments: &[Payment],
        transfer_type: TransferType,
        recent_blockhash: &[u8; 32],
    ) -> Result<PaymentTransaction, SdkError> {
        if payments.is_empty() {
            return Err(SdkError::InvalidPayment("no payments".into()));
        }
        let invoices = collect_invoices(payments)?;
        let key = invoices
            .as_ref()
            .map(foreign_key)
            .unwrap_or([0u8; FOREIGN_KEY_LEN]);
        let memo = BinaryMemo::new(
            self.config.memo_version,
            transfer_type,
            self.config.app_index,
            key,
        )?;

        let owner = signer.public_key();
        let mut instructions: Vec<SolInstruction> = Vec::with_capacity(payments.len() + 1);
        instructions.push(memo_instruction(&memo.to_instruction_data()));
        for payment in payments {
            instructions.push(token_transfer(
                source,
                &payment.destination,
                &owner,
                payment.amount,
            )?);
        }

        resolve_and_validate(&classify_all(&instructions), invoices.as_ref())?;

        let message = compile_transaction(&instructions, &owner, recent_blockhash)?;
        let mut tx = Transaction::new_unsigned(message);
        sign_with(&mut tx, signer)?;
        let envelope = tx.serialize()?;
        let id = tx.id()?;

        debug!(%id, transfers = payments.len(), bound = invoices.is_some(), "payment built");
        Ok(PaymentTransaction {
            id,
            envelope,
            invoices,
        })
    }

    // -----------------------------------------------------------------------
    // Submission and history
    // -----------------------------------------------------------------------

    /// Track `envelope` as inflight, submit it and record the outcome.
    ///
    /// A rejection or transport failure removes the inflight record again,
    /// leaving the cache as it was. History polling may confirm the
    /// transaction while the submission is still outstanding; the
    /// historical record then stands and is what a successful submission
    /// returns.
    pub fn submit(
        &self,
        account: &PublicKey,
        envelope: Vec<u8>,
    ) -> Result<StoredTransaction, SdkError> {
        let stored = self.cache.upsert_submitted(account, envelope)?;
        let id = stored.id;

        match self.transport.submit_transaction(&stored.envelope) {
            Ok(SubmissionResult::Success { result_bytes }) => {
                info!(%id, "transaction submitted");
                match self.cache.apply_submission_result(account, &id, result_bytes) {
                    Ok(tx) => Ok(tx),
                    Err(CacheError::Regression {
                        from: TransactionStatus::Historical,
                        ..
                    }) => {
                        debug!(%id, "submission already confirmed by history");
                        self.cache
                            .transaction(account, &id)
                            .ok_or(SdkError::Cache(CacheError::NotFound(id)))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Ok(SubmissionResult::Rejected { reason }) => {
                warn!(%id, %reason, "transaction rejected");
                self.release(account, &id)?;
                Err(SdkError::Rejected(reason))
            }
            Err(err) => {
                warn!(%id, error = %err, "transaction submission failed");
                self.release(account, &id)?;
                Err(err.into())
            }
        }
    }

    /// Drop the inflight record of a failed submission. A record that
    /// history has already moved on is left alone.
    fn release(&self, account: &PublicKey, id: &TransactionId) -> Result<(), SdkError> {
        match self.cache.abandon_submission(account, id) {
            Err(CacheError::Regression { from, .. }) => {
                debug!(%id, status = ?from, "failed submission already advanced by history");
                Ok(())
            }
            other => other.map_err(SdkError::from),
        }
    }

    /// Remember the payment's invoices, then submit it.
    pub fn send_payment(
        &self,
        account: &PublicKey,
        payment: PaymentTransaction,
    ) -> Result<StoredTransaction, SdkError> {
        if let Some(list) = payment.invoices {
            self.cache.add_invoice_lists(account, vec![list])?;
        }
        self.submit(account, payment.envelope)
    }

    /// Page forward from the newest known paging token until the server
    /// has nothing newer, merging every page.
    pub fn refresh_history(&self, account: &PublicKey) -> Result<MergeOutcome, SdkError> {
        let mut total = MergeOutcome::default();
        loop {
            let cursor = self.paging_bounds(account).0;
            let page = self
                .transport
                .get_history(account, cursor.as_ref(), HistoryDirection::Newer)?;
            if page.items.is_empty() {
                break;
            }
            debug!(%account, items = page.items.len(), "newer history page fetched");
            total += self.cache.merge_history_page(account, page)?;
            if self.paging_bounds(account).0 == cursor {
                break;
            }
        }
        Ok(total)
    }

    /// Fetch one page of history older than the oldest known paging token.
    /// An outcome with nothing inserted means the start of history was
    /// reached.
    pub fn fetch_older_history(&self, account: &PublicKey) -> Result<MergeOutcome, SdkError> {
        let cursor = self.paging_bounds(account).1;
        let page = self
            .transport
            .get_history(account, cursor.as_ref(), HistoryDirection::Older)?;
        debug!(%account, items = page.items.len(), "older history page fetched");
        if page.items.is_empty() {
            return Ok(MergeOutcome::default());
        }
        Ok(self.cache.merge_history_page(account, page)?)
    }

    fn paging_bounds(&self, account: &PublicKey) -> (Option<PagingToken>, Option<PagingToken>) {
        self.cache
            .transactions(account)
            .map(|h| (h.head_paging_token, h.tail_paging_token))
            .unwrap_or_default()
    }

    pub fn invoices_for(&self, account: &PublicKey, id: &TransactionId) -> Option<InvoiceList> {
        self.cache.invoice_list_for_transaction(account, id)
    }
}

fn collect_invoices(payments: &[Payment]) -> Result<Option<InvoiceList>, SdkError> {
    let invoices: Vec<Invoice> = payments.iter().filter_map(|p| p.invoice.clone()).collect();
    if invoices.is_empty() {
        return Ok(None);
    }
    if invoices.len() != payments.len() {
        return Err(SdkError::InvalidPayment(format!(
            "{} of {} payments have invoices; either all or none must",
            invoices.len(),
            payments.len()
        )));
    }
    Ok(Some(InvoiceList::new(invoices)?))
}
