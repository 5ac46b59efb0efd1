//! Records owned by the transaction state cache.

use std::fmt;

use kin_solana::{classify_envelope, transaction_id, Instruction, PrivateKey, PublicKey, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    #[default]
    Unregistered,
    Registered,
}

/// Quark balances of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Confirmed by the network.
    pub quarks: u64,
    /// Confirmed balance net of unconfirmed outgoing transfers.
    pub pending_quarks: u64,
}

impl Balance {
    pub fn confirmed(quarks: u64) -> Self {
        Self {
            quarks,
            pending_quarks: quarks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub public_key: PublicKey,
    /// Only for locally custodied accounts. Never persisted.
    #[serde(skip)]
    pub private_key: Option<PrivateKey>,
    /// Token accounts owned by this account.
    #[serde(default)]
    pub token_accounts: Vec<PublicKey>,
    #[serde(default)]
    pub balance: Balance,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub sequence: u64,
}

impl Account {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            private_key: None,
            token_accounts: Vec::new(),
            balance: Balance::default(),
            status: AccountStatus::Unregistered,
            sequence: 0,
        }
    }

    pub fn local(private_key: PrivateKey) -> Self {
        let mut account = Self::new(private_key.public_key());
        account.private_key = Some(private_key);
        account
    }

    /// True if `key` is this account or one of its token accounts.
    pub fn controls(&self, key: &PublicKey) -> bool {
        *key == self.public_key || self.token_accounts.contains(key)
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Lifecycle of a locally tracked transaction. Ordering follows the
/// lifecycle; the cache only ever moves a record forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Inflight,
    Acknowledged,
    Historical,
}

/// Opaque history cursor issued by the server. Compared bytewise, so
/// big-endian numeric cursors order numerically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PagingToken(#[serde(with = "hex_serde")] Vec<u8>);

impl PagingToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u64> for PagingToken {
    fn from(cursor: u64) -> Self {
        Self(cursor.to_be_bytes().to_vec())
    }
}

impl fmt::Debug for PagingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PagingToken({})", hex::encode(&self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: TransactionId,
    /// Signed wire transaction.
    #[serde(with = "hex_serde")]
    pub envelope: Vec<u8>,
    pub status: TransactionStatus,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Absent while inflight.
    #[serde(default, with = "hex_serde::option")]
    pub result_bytes: Option<Vec<u8>>,
    /// Only set once historical.
    #[serde(default)]
    pub paging_token: Option<PagingToken>,
}

impl StoredTransaction {
    /// A freshly submitted transaction.
    pub fn inflight(envelope: Vec<u8>, timestamp_ms: u64) -> Result<Self, CacheError> {
        Ok(Self {
            id: transaction_id(&envelope)?,
            envelope,
            status: TransactionStatus::Inflight,
            timestamp_ms,
            result_bytes: None,
            paging_token: None,
        })
    }

    /// A record as returned by history paging.
    pub fn historical(
        envelope: Vec<u8>,
        result_bytes: Vec<u8>,
        paging_token: PagingToken,
        timestamp_ms: u64,
    ) -> Result<Self, CacheError> {
        Ok(Self {
            id: transaction_id(&envelope)?,
            envelope,
            status: TransactionStatus::Historical,
            timestamp_ms,
            result_bytes: Some(result_bytes),
            paging_token: Some(paging_token),
        })
    }

    pub fn instructions(&self) -> Result<Vec<Instruction>, CacheError> {
        Ok(classify_envelope(&self.envelope)?)
    }

    /// Sum of transfers in this transaction that spend from `account`.
    pub fn outgoing_quarks(&self, account: &Account) -> u64 {
        let Ok(instructions) = classify_envelope(&self.envelope) else {
            return 0;
        };
        instructions
            .iter()
            .filter_map(|ix| match ix {
                Instruction::Transfer {
                    source,
                    owner,
                    amount,
                    ..
                } if *owner == account.public_key || account.controls(source) => Some(*amount),
                _ => None,
            })
            .fold(0u64, u64::saturating_add)
    }

    pub fn is_pending(&self) -> bool {
        self.status != TransactionStatus::Historical
    }
}

/// A window of transaction history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub items: Vec<StoredTransaction>,
    pub head_paging_token: Option<PagingToken>,
    pub tail_paging_token: Option<PagingToken>,
}

/// Everything cached for one account: pending records first, then
/// historical records newest first, bounded by the known paging tokens.
pub type TransactionHistory = TransactionPage;

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|text| hex::decode(text).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kin_solana::{compile_transaction, sign_transaction, token_transfer};

    fn envelope(owner: &PrivateKey, source: PublicKey, amount: u64) -> Vec<u8> {
        let ix = token_transfer(&source, &PublicKey::new([2; 32]), &owner.public_key(), amount)
            .unwrap();
        let message = compile_transaction(&[ix], &owner.public_key(), &[0u8; 32]).unwrap();
        sign_transaction(&message, &[owner]).unwrap()
    }

    #[test]
    fn status_order_follows_lifecycle() {
        assert!(TransactionStatus::Unknown < TransactionStatus::Inflight);
        assert!(TransactionStatus::Inflight < TransactionStatus::Acknowledged);
        assert!(TransactionStatus::Acknowledged < TransactionStatus::Historical);
    }

    #[test]
    fn paging_tokens_order_numerically() {
        assert!(PagingToken::from(2) < PagingToken::from(10));
        assert!(PagingToken::from(255) < PagingToken::from(256));
    }

    #[test]
    fn inflight_rejects_garbage_envelope() {
        assert!(matches!(
            StoredTransaction::inflight(vec![1, 2, 3], 0),
            Err(CacheError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn outgoing_counts_owner_and_token_accounts() {
        let owner = PrivateKey::from_bytes([7; 32]);
        let token = PublicKey::new([9; 32]);
        let mut account = Account::local(owner.clone());
        account.token_accounts.push(token);

        let tx = StoredTransaction::inflight(envelope(&owner, token, 40), 0).unwrap();
        assert_eq!(tx.outgoing_quarks(&account), 40);

        let stranger = Account::new(PublicKey::new([5; 32]));
        assert_eq!(tx.outgoing_quarks(&stranger), 0);
    }

    #[test]
    fn stored_transaction_json_uses_hex() {
        let owner = PrivateKey::from_bytes([7; 32]);
        let tx = StoredTransaction::historical(
            envelope(&owner, PublicKey::new([9; 32]), 1),
            vec![0xde, 0xad],
            PagingToken::from(1),
            5,
        )
        .unwrap();

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["result_bytes"], "dead");
        assert_eq!(json["paging_token"], "0000000000000001");

        let back: StoredTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn private_key_is_not_serialized() {
        let account = Account::local(PrivateKey::from_bytes([3; 32]));
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("private_key"));
        let back: Account = serde_json::from_str(&json).unwrap();
        assert!(back.private_key.is_none());
        assert_eq!(back.public_key, account.public_key);
    }
}
