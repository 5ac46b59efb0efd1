//! Cross-crate integration tests exercising the full pipeline:
//! build payment -> bind invoices -> sign -> submit -> poll history.
//!
//! The network is replaced by an in-process ledger that confirms every
//! accepted transaction and serves it back through history paging.

use std::sync::Barrier;

use kin_sdk::*;
use kin_solana::{classify_envelope, derive_associated_token_address, Instruction};
use parking_lot::Mutex;

// ─── Test doubles ──────────────────────────────────────────────────

#[derive(Default)]
struct MockLedger {
    confirmed: Vec<StoredTransaction>,
    next_token: u64,
    fail_next: Option<TransportError>,
    reject_next: Option<String>,
    submissions: usize,
    page_limit: Option<usize>,
}

#[derive(Default)]
struct MockTransport {
    ledger: Mutex<MockLedger>,
}

impl MockTransport {
    fn with_page_limit(limit: usize) -> Self {
        let transport = Self::default();
        transport.ledger.lock().page_limit = Some(limit);
        transport
    }

    fn fail_next(&self, err: TransportError) {
        self.ledger.lock().fail_next = Some(err);
    }

    fn reject_next(&self, reason: &str) {
        self.ledger.lock().reject_next = Some(reason.into());
    }

    fn submissions(&self) -> usize {
        self.ledger.lock().submissions
    }

    /// Land `envelope` on the ledger without going through submission.
    fn confirm(&self, envelope: &[u8]) -> Result<(), TransportError> {
        let mut ledger = self.ledger.lock();
        ledger.next_token += 1;
        let token = PagingToken::from(ledger.next_token);
        let record =
            StoredTransaction::historical(envelope.to_vec(), vec![0x01], token, 1_700_000_000_000)
                .map_err(|e| TransportError::Server(e.to_string()))?;
        ledger.confirmed.push(record);
        Ok(())
    }
}

impl TransactionTransport for MockTransport {
    fn submit_transaction(&self, envelope: &[u8]) -> Result<SubmissionResult, TransportError> {
        {
            let mut ledger = self.ledger.lock();
            if let Some(err) = ledger.fail_next.take() {
                return Err(err);
            }
            ledger.submissions += 1;
            if let Some(reason) = ledger.reject_next.take() {
                return Ok(SubmissionResult::Rejected { reason });
            }
        }
        self.confirm(envelope)?;
        Ok(SubmissionResult::Success {
            result_bytes: vec![0x01],
        })
    }

    fn get_history(
        &self,
        _account: &PublicKey,
        cursor: Option<&PagingToken>,
        direction: HistoryDirection,
    ) -> Result<TransactionPage, TransportError> {
        let ledger = self.ledger.lock();
        let limit = ledger.page_limit.unwrap_or(usize::MAX);
        // The ledger is kept oldest first.
        let mut items: Vec<StoredTransaction> = match (cursor, direction) {
            (None, _) => ledger.confirmed.iter().rev().take(limit).cloned().collect(),
            (Some(c), HistoryDirection::Newer) => ledger
                .confirmed
                .iter()
                .filter(|t| t.paging_token.as_ref() > Some(c))
                .take(limit)
                .cloned()
                .collect(),
            (Some(c), HistoryDirection::Older) => ledger
                .confirmed
                .iter()
                .rev()
                .filter(|t| t.paging_token.as_ref() < Some(c))
                .take(limit)
                .cloned()
                .collect(),
        };
        items.sort_by(|a, b| b.paging_token.cmp(&a.paging_token));
        Ok(TransactionPage {
            head_paging_token: items.first().and_then(|t| t.paging_token.clone()),
            tail_paging_token: items.last().and_then(|t| t.paging_token.clone()),
            items,
        })
    }
}

/// Lands every submission on the ledger, then holds the response back until
/// a history poll on another thread has run.
struct RacingTransport {
    ledger: MockTransport,
    gate: Barrier,
    outcome: Mutex<Option<TransportError>>,
}

impl RacingTransport {
    fn new(outcome: Option<TransportError>) -> Self {
        Self {
            ledger: MockTransport::default(),
            gate: Barrier::new(2),
            outcome: Mutex::new(outcome),
        }
    }
}

impl TransactionTransport for RacingTransport {
    fn submit_transaction(&self, envelope: &[u8]) -> Result<SubmissionResult, TransportError> {
        self.ledger.confirm(envelope)?;
        self.gate.wait();
        self.gate.wait();
        match self.outcome.lock().take() {
            Some(err) => Err(err),
            None => Ok(SubmissionResult::Success {
                result_bytes: vec![0x02],
            }),
        }
    }

    fn get_history(
        &self,
        account: &PublicKey,
        cursor: Option<&PagingToken>,
        direction: HistoryDirection,
    ) -> Result<TransactionPage, TransportError> {
        self.ledger.get_history(account, cursor, direction)
    }
}

// ─── Fixtures ──────────────────────────────────────────────────────

const APP_INDEX: u16 = 42;
const BLOCKHASH: [u8; 32] = [7u8; 32];

fn signer() -> LocalSigner {
    LocalSigner::new(PrivateKey::from_bytes([0x5a; 32]))
}

fn token_account() -> PublicKey {
    PublicKey::new([0x77; 32])
}

fn client() -> KinClient<MockTransport> {
    let config = SdkConfig::new(KinNetwork::Testnet).with_app_index(APP_INDEX);
    let client = KinClient::new(config, MockTransport::default()).unwrap();
    client.add_account(funded(1_000)).unwrap();
    client
}

fn funded(quarks: u64) -> Account {
    let signer = signer();
    let mut account = Account::local(signer.private_key().clone());
    account.token_accounts.push(token_account());
    account.balance = Balance::confirmed(quarks);
    account.status = AccountStatus::Registered;
    account
}

fn invoice(title: &str, amount: u64) -> Invoice {
    Invoice::new(vec![LineItem::new(title, None, amount, None).unwrap()]).unwrap()
}

/// `count` distinct signed single-transfer envelopes.
fn signed_envelopes<T: TransactionTransport>(client: &KinClient<T>, count: u8) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut blockhash = BLOCKHASH;
            blockhash[1] = i;
            client
                .build_payment_transaction(
                    &signer(),
                    &token_account(),
                    &[Payment::new(PublicKey::new([1; 32]), 1 + u64::from(i))],
                    TransferType::P2p,
                    &blockhash,
                )
                .unwrap()
                .envelope
        })
        .collect()
}

fn history_tokens<T: TransactionTransport>(
    client: &KinClient<T>,
    account: &PublicKey,
) -> Vec<PagingToken> {
    client
        .history(account)
        .unwrap()
        .items
        .iter()
        .filter_map(|t| t.paging_token.clone())
        .collect()
}

fn tokens(range: impl DoubleEndedIterator<Item = u64>) -> Vec<PagingToken> {
    range.rev().map(PagingToken::from).collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kin_sdk=debug,kin_storage=debug")
        .with_test_writer()
        .try_init();
}

// ─── Happy path ────────────────────────────────────────────────────

#[test]
fn invoiced_payment_full_pipeline() {
    init_tracing();
    let client = client();
    let signer = signer();
    let account = signer.public_key();

    // 1. Build a two-transfer payment with one invoice per transfer.
    let payments = [
        Payment::new(PublicKey::new([1; 32]), 100).with_invoice(invoice("Sword", 100)),
        Payment::new(PublicKey::new([2; 32]), 50).with_invoice(invoice("Shield", 50)),
    ];
    let payment = client
        .build_payment_transaction(
            &signer,
            &token_account(),
            &payments,
            TransferType::Spend,
            &BLOCKHASH,
        )
        .unwrap();
    let invoices = payment.invoices.clone().unwrap();

    // 2. The envelope carries a memo bound to exactly those invoices.
    let instructions = classify_envelope(&payment.envelope).unwrap();
    let bound = resolve_and_validate(&instructions, Some(&invoices)).unwrap();
    let memo = bound[0].memo.unwrap();
    assert_eq!(memo.app_index(), APP_INDEX);
    assert_eq!(memo.transfer_type(), TransferType::Spend);
    assert!(matches!(instructions[1], Instruction::Transfer { amount: 100, .. }));

    // 3. Submit: acknowledged by the network.
    let stored = client.send_payment(&account, payment.clone()).unwrap();
    assert_eq!(stored.id, payment.id);
    assert_eq!(stored.status, TransactionStatus::Acknowledged);
    assert_eq!(stored.result_bytes, Some(vec![0x01]));

    // 4. History polling upgrades it to historical.
    let outcome = client.refresh_history(&account).unwrap();
    assert_eq!(outcome.upgraded, 1);
    let history = client.history(&account).unwrap();
    assert_eq!(history.items[0].status, TransactionStatus::Historical);
    assert_eq!(history.head_paging_token, Some(PagingToken::from(1)));

    // 5. The invoices can be recovered from the transaction.
    assert_eq!(client.invoices_for(&account, &payment.id), Some(invoices));
}

#[test]
fn unbound_payment_carries_zero_foreign_key() {
    let client = client();
    let signer = signer();
    let payment = client
        .build_payment_transaction(
            &signer,
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();
    assert!(payment.invoices.is_none());

    let instructions = classify_envelope(&payment.envelope).unwrap();
    let bound = resolve_and_validate(&instructions, None).unwrap();
    assert!(!bound[0].memo.unwrap().has_foreign_key());
}

#[test]
fn configured_memo_version_is_written() {
    let mut config = SdkConfig::new(KinNetwork::Testnet);
    config.memo_version = 2;
    let client = KinClient::new(config, MockTransport::default()).unwrap();
    let payment = client
        .build_payment_transaction(
            &signer(),
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::Earn,
            &BLOCKHASH,
        )
        .unwrap();

    let instructions = classify_envelope(&payment.envelope).unwrap();
    let Instruction::Memo(memo) = &instructions[0] else {
        panic!("first instruction is not a memo");
    };
    assert_eq!(BinaryMemo::from_instruction_data(&memo.data).unwrap().version(), 2);
}

#[test]
fn refresh_is_incremental() {
    let client = client();
    let signer = signer();
    let account = signer.public_key();

    for (i, amount) in [10u64, 20, 30].into_iter().enumerate() {
        let mut blockhash = BLOCKHASH;
        blockhash[0] = i as u8;
        let payment = client
            .build_payment_transaction(
                &signer,
                &token_account(),
                &[Payment::new(PublicKey::new([1; 32]), amount)],
                TransferType::P2p,
                &blockhash,
            )
            .unwrap();
        client.submit(&account, payment.envelope).unwrap();
    }

    assert_eq!(client.refresh_history(&account).unwrap().upgraded, 3);
    assert_eq!(client.refresh_history(&account).unwrap(), MergeOutcome::default());

    let history = client.history(&account).unwrap();
    let tokens: Vec<PagingToken> = history
        .items
        .iter()
        .filter_map(|t| t.paging_token.clone())
        .collect();
    assert_eq!(
        tokens,
        vec![PagingToken::from(3), PagingToken::from(2), PagingToken::from(1)]
    );
    assert_eq!(history.tail_paging_token, Some(PagingToken::from(1)));
}

// ─── Failure paths ─────────────────────────────────────────────────

#[test]
fn transport_failure_leaves_no_trace() {
    let client = client();
    let signer = signer();
    let account = signer.public_key();
    let payment = client
        .build_payment_transaction(
            &signer,
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();

    client.transport().fail_next(TransportError::Timeout);
    let err = client.submit(&account, payment.envelope.clone()).unwrap_err();
    assert!(matches!(err, SdkError::Transport(TransportError::Timeout)));
    assert_eq!(
        client.cache().transaction_status(&account, &payment.id),
        TransactionStatus::Unknown
    );
    assert_eq!(client.account(&account).unwrap().balance.pending_quarks, 1_000);

    // A retry of the same envelope goes through.
    let stored = client.submit(&account, payment.envelope).unwrap();
    assert_eq!(stored.status, TransactionStatus::Acknowledged);
}

#[test]
fn rejection_is_surfaced_and_rolled_back() {
    let client = client();
    let signer = signer();
    let account = signer.public_key();
    let payment = client
        .build_payment_transaction(
            &signer,
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();

    client.transport().reject_next("insufficient funds");
    assert!(matches!(
        client.submit(&account, payment.envelope),
        Err(SdkError::Rejected(reason)) if reason == "insufficient funds"
    ));
    assert_eq!(
        client.cache().transaction_status(&account, &payment.id),
        TransactionStatus::Unknown
    );
}

#[test]
fn duplicate_submission_is_refused_before_the_network() {
    let client = client();
    let signer = signer();
    let account = signer.public_key();
    let payment = client
        .build_payment_transaction(
            &signer,
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();

    client.submit(&account, payment.envelope.clone()).unwrap();
    assert!(matches!(
        client.submit(&account, payment.envelope),
        Err(SdkError::Cache(kin_storage::CacheError::AlreadyExists(_)))
    ));
    assert_eq!(client.transport().submissions(), 1);
}

#[test]
fn partial_invoices_are_rejected() {
    let client = client();
    let payments = [
        Payment::new(PublicKey::new([1; 32]), 10).with_invoice(invoice("A", 10)),
        Payment::new(PublicKey::new([2; 32]), 10),
    ];
    assert!(matches!(
        client.build_payment_transaction(
            &signer(),
            &token_account(),
            &payments,
            TransferType::Spend,
            &BLOCKHASH
        ),
        Err(SdkError::InvalidPayment(_))
    ));
}

#[test]
fn token_account_follows_network_mint() {
    let owner = signer().public_key();
    let testnet = client().token_account(&owner).unwrap();
    assert_eq!(
        testnet,
        derive_associated_token_address(&owner, &TESTNET_KIN_MINT).unwrap()
    );

    let mainnet = KinClient::new(SdkConfig::new(KinNetwork::Mainnet), MockTransport::default())
        .unwrap()
        .token_account(&owner)
        .unwrap();
    assert_ne!(mainnet, testnet);

    let client = client();
    let payment = client
        .build_payment_transaction(
            &signer(),
            &testnet,
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();
    let instructions = classify_envelope(&payment.envelope).unwrap();
    assert!(matches!(
        instructions[1],
        Instruction::Transfer { source, .. } if source == testnet
    ));
}

// ─── History paging ────────────────────────────────────────────────

#[test]
fn refresh_pages_through_a_gap() {
    let client = KinClient::new(SdkConfig::default(), MockTransport::with_page_limit(2)).unwrap();
    let account = signer().public_key();
    let envelopes = signed_envelopes(&client, 5);

    client.transport().confirm(&envelopes[0]).unwrap();
    assert_eq!(client.refresh_history(&account).unwrap().inserted, 1);

    for envelope in &envelopes[1..] {
        client.transport().confirm(envelope).unwrap();
    }
    assert_eq!(client.refresh_history(&account).unwrap().inserted, 4);
    assert_eq!(history_tokens(&client, &account), tokens(1..=5));
}

#[test]
fn older_history_backfills_from_the_tail() {
    let client = KinClient::new(SdkConfig::default(), MockTransport::with_page_limit(2)).unwrap();
    let account = signer().public_key();
    for envelope in signed_envelopes(&client, 5) {
        client.transport().confirm(&envelope).unwrap();
    }

    // Only the newest page is fetched forward.
    assert_eq!(client.refresh_history(&account).unwrap().inserted, 2);
    assert_eq!(history_tokens(&client, &account), tokens(4..=5));

    assert_eq!(client.fetch_older_history(&account).unwrap().inserted, 2);
    assert_eq!(client.fetch_older_history(&account).unwrap().inserted, 1);
    assert_eq!(
        client.fetch_older_history(&account).unwrap(),
        MergeOutcome::default()
    );

    let history = client.history(&account).unwrap();
    assert_eq!(history_tokens(&client, &account), tokens(1..=5));
    assert_eq!(history.head_paging_token, Some(PagingToken::from(5)));
    assert_eq!(history.tail_paging_token, Some(PagingToken::from(1)));
}

// ─── Submission racing history ─────────────────────────────────────

/// Submit one payment while another thread polls history between the
/// ledger confirming it and the submission response arriving.
fn submit_racing_history(
    outcome: Option<TransportError>,
) -> (
    KinClient<RacingTransport>,
    TransactionId,
    Result<StoredTransaction, SdkError>,
) {
    let client = KinClient::new(SdkConfig::default(), RacingTransport::new(outcome)).unwrap();
    client.add_account(funded(1_000)).unwrap();
    let account = signer().public_key();
    let payment = client
        .build_payment_transaction(
            &signer(),
            &token_account(),
            &[Payment::new(PublicKey::new([1; 32]), 10)],
            TransferType::P2p,
            &BLOCKHASH,
        )
        .unwrap();

    let result = std::thread::scope(|s| {
        s.spawn(|| {
            client.transport().gate.wait();
            assert_eq!(client.refresh_history(&account).unwrap().upgraded, 1);
            client.transport().gate.wait();
        });
        client.submit(&account, payment.envelope.clone())
    });
    (client, payment.id, result)
}

#[test]
fn submission_confirmed_by_history_first_succeeds() {
    init_tracing();
    let (client, id, result) = submit_racing_history(None);
    let account = signer().public_key();

    let stored = result.unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.status, TransactionStatus::Historical);
    assert_eq!(stored.paging_token, Some(PagingToken::from(1)));
    assert_eq!(
        client.cache().transaction_status(&account, &id),
        TransactionStatus::Historical
    );
}

#[test]
fn failed_response_keeps_history_confirmed_record() {
    let (client, id, result) = submit_racing_history(Some(TransportError::Timeout));
    let account = signer().public_key();

    assert!(matches!(
        result,
        Err(SdkError::Transport(TransportError::Timeout))
    ));
    assert_eq!(
        client.cache().transaction_status(&account, &id),
        TransactionStatus::Historical
    );
}

// ─── Persistence ───────────────────────────────────────────────────

#[test]
fn file_backed_client_resumes_after_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = SdkConfig::new(KinNetwork::Mainnet).with_storage_dir(dir.path());
    let signer = signer();
    let account = signer.public_key();

    let id = {
        let client = KinClient::new(config.clone(), MockTransport::default()).unwrap();
        client.add_account(funded(500)).unwrap();
        let payment = client
            .build_payment_transaction(
                &signer,
                &token_account(),
                &[Payment::new(PublicKey::new([1; 32]), 10).with_invoice(invoice("Tea", 10))],
                TransferType::Spend,
                &BLOCKHASH,
            )
            .unwrap();
        client.send_payment(&account, payment).unwrap().id
    };

    let client = KinClient::new(config, MockTransport::default()).unwrap();
    assert_eq!(
        client.cache().transaction_status(&account, &id),
        TransactionStatus::Acknowledged
    );
    assert!(client.invoices_for(&account, &id).is_some());
    assert!(dir
        .path()
        .join("kin_storage/env/mainnet/kin_accounts")
        .join(account.to_base58())
        .join("transactions.json")
        .is_file());
}
