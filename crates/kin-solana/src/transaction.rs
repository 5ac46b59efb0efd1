//! Kin transaction wire format, signing and decoding.
//!
//! Kin rides on Solana's compact binary transaction layout. We build,
//! serialize and parse it by hand instead of depending on `solana-sdk`:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! A transaction is identified by its first signature, which belongs to the
//! fee payer.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::PublicKey;
use crate::error::SolError;
use crate::keys::PrivateKey;

pub const SIGNATURE_LEN: usize = 64;

/// Largest number of accounts a message can reference (indices are `u8`).
const MAX_ACCOUNT_KEYS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from the front of `data`.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated or
/// the value overflows `u16`.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let Some(&byte) = data.get(consumed) else {
            return Err(SolError::MalformedTransaction(
                "unexpected end of data while decoding compact-u16".into(),
            ));
        };
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::MalformedTransaction(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, SolError> {
    let len = u16::try_from(len)
        .map_err(|_| SolError::TransactionBuildError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(len))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: PublicKey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: PublicKey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: PublicKey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolInstruction {
    pub program_id: PublicKey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Number of required signatures (first N account keys are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,
}

/// An instruction whose account references were replaced by indices into
/// the message's `account_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// Account keys in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<PublicKey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

/// A message together with its signature slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<[u8; SIGNATURE_LEN]>,
    pub message: Message,
}

/// Ledger identifier of a transaction: its first (fee payer) signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; SIGNATURE_LEN]);

impl TransactionId {
    pub const fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = bs58::decode(&text)
            .into_vec()
            .map_err(serde::de::Error::custom)?;
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("transaction id must be 64 bytes"))?;
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile instructions into a message with a single fee payer.
///
/// The fee payer is always the first signer and is placed at index 0 in the
/// account keys.
pub fn compile_transaction(
    instructions: &[SolInstruction],
    fee_payer: &PublicKey,
    recent_blockhash: &[u8; 32],
) -> Result<Message, SolError> {
    Message::compile(instructions, fee_payer, recent_blockhash)
}

impl Message {
    pub fn compile(
        instructions: &[SolInstruction],
        fee_payer: &PublicKey,
        recent_blockhash: &[u8; 32],
    ) -> Result<Self, SolError> {
        struct AccountEntry {
            pubkey: PublicKey,
            is_signer: bool,
            is_writable: bool,
        }

        // Instruction account lists are tiny; a Vec keeps insertion order.
        let mut entries: Vec<AccountEntry> = Vec::new();
        let mut upsert = |pubkey: PublicKey, signer: bool, writable: bool| {
            if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
                entry.is_signer |= signer;
                entry.is_writable |= writable;
            } else {
                entries.push(AccountEntry {
                    pubkey,
                    is_signer: signer,
                    is_writable: writable,
                });
            }
        };

        upsert(*fee_payer, true, true);
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        if entries.len() > MAX_ACCOUNT_KEYS {
            return Err(SolError::TransactionBuildError(format!(
                "too many accounts: {}",
                entries.len()
            )));
        }

        // Stable sort: the fee payer was inserted first and stays at index 0.
        entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        let count = |pred: fn(&AccountEntry) -> bool| -> Result<u8, SolError> {
            let n = entries.iter().filter(|e| pred(e)).count();
            u8::try_from(n).map_err(|_| {
                SolError::TransactionBuildError(format!("{n} accounts overflow the message header"))
            })
        };
        let header = MessageHeader {
            num_required_signatures: count(|e| e.is_signer)?,
            num_readonly_signed: count(|e| e.is_signer && !e.is_writable)?,
            num_readonly_unsigned: count(|e| !e.is_signer && !e.is_writable)?,
        };

        let account_keys: Vec<PublicKey> = entries.iter().map(|e| e.pubkey).collect();
        let index_of = |key: &PublicKey| -> Result<u8, SolError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|idx| idx as u8)
                .ok_or_else(|| SolError::TransactionBuildError(format!("{key} not in account keys")))
        };

        let mut compiled = Vec::with_capacity(instructions.len());
        for ix in instructions {
            let account_indices = ix
                .accounts
                .iter()
                .map(|meta| index_of(&meta.pubkey))
                .collect::<Result<Vec<u8>, SolError>>()?;
            compiled.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                account_indices,
                data: ix.data.clone(),
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash: *recent_blockhash,
            instructions: compiled,
        })
    }

    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);

        buf.push(self.header.num_required_signatures);
        buf.push(self.header.num_readonly_signed);
        buf.push(self.header.num_readonly_unsigned);

        buf.extend_from_slice(&compact_len(self.account_keys.len(), "account keys")?);
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&compact_len(self.instructions.len(), "instructions")?);
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            buf.extend_from_slice(&compact_len(ix.account_indices.len(), "instruction accounts")?);
            buf.extend_from_slice(&ix.account_indices);
            buf.extend_from_slice(&compact_len(ix.data.len(), "instruction data bytes")?);
            buf.extend_from_slice(&ix.data);
        }

        Ok(buf)
    }

    /// Parse a serialized message. The whole input must be consumed.
    pub fn decode(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(bytes);
        let message = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(SolError::MalformedTransaction(format!(
                "{} trailing bytes after message",
                reader.remaining()
            )));
        }
        Ok(message)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, SolError> {
        let header = MessageHeader {
            num_required_signatures: reader.read_u8("header")?,
            num_readonly_signed: reader.read_u8("header")?,
            num_readonly_unsigned: reader.read_u8("header")?,
        };

        let num_accounts = reader.read_compact_u16("account count")?;
        let mut account_keys = Vec::with_capacity(num_accounts);
        for _ in 0..num_accounts {
            account_keys.push(PublicKey::new(reader.read_array("account key")?));
        }

        let signers = header.num_required_signatures as usize;
        if signers > num_accounts
            || header.num_readonly_signed > header.num_required_signatures
            || header.num_readonly_unsigned as usize > num_accounts - signers
        {
            return Err(SolError::MalformedTransaction(
                "message header inconsistent with account keys".into(),
            ));
        }

        let recent_blockhash = reader.read_array("recent blockhash")?;

        let num_instructions = reader.read_compact_u16("instruction count")?;
        let mut instructions = Vec::with_capacity(num_instructions);
        for _ in 0..num_instructions {
            let program_id_index = reader.read_u8("program id index")?;
            let n = reader.read_compact_u16("instruction account count")?;
            let account_indices = reader.take(n, "instruction accounts")?.to_vec();
            let len = reader.read_compact_u16("instruction data length")?;
            let data = reader.take(len, "instruction data")?.to_vec();

            let out_of_range = std::iter::once(&program_id_index)
                .chain(account_indices.iter())
                .any(|idx| *idx as usize >= num_accounts);
            if out_of_range {
                return Err(SolError::MalformedTransaction(
                    "instruction references an unknown account".into(),
                ));
            }

            instructions.push(CompiledInstruction {
                program_id_index,
                account_indices,
                data,
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// The accounts that must sign this message, fee payer first.
    pub fn signers(&self) -> &[PublicKey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signers = self.header.num_required_signatures as usize;
        if index < signers {
            index < signers.saturating_sub(self.header.num_readonly_signed as usize)
        } else {
            index
                < self
                    .account_keys
                    .len()
                    .saturating_sub(self.header.num_readonly_unsigned as usize)
        }
    }

    /// Recover the original instructions, in order, with their account roles.
    pub fn decompile(&self) -> Result<Vec<SolInstruction>, SolError> {
        let key_at = |idx: u8| -> Result<PublicKey, SolError> {
            self.account_keys.get(idx as usize).copied().ok_or_else(|| {
                SolError::MalformedTransaction(format!("account index {idx} out of range"))
            })
        };

        self.instructions
            .iter()
            .map(|ix| {
                let accounts = ix
                    .account_indices
                    .iter()
                    .map(|&idx| {
                        Ok(AccountMeta {
                            pubkey: key_at(idx)?,
                            is_signer: self.is_signer(idx as usize),
                            is_writable: self.is_writable(idx as usize),
                        })
                    })
                    .collect::<Result<Vec<_>, SolError>>()?;
                Ok(SolInstruction {
                    program_id: key_at(ix.program_id_index)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

impl Transaction {
    /// Wrap a message with zeroed signature slots for every required signer.
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![[0u8; SIGNATURE_LEN]; slots],
            message,
        }
    }

    /// Sign the message with each key, writing into the signer's slot.
    ///
    /// Slots of signers that are not supplied stay as they are, which lets a
    /// subsidizer countersign later.
    pub fn sign(&mut self, keys: &[&PrivateKey]) -> Result<(), SolError> {
        let message_bytes = self.message.serialize()?;
        let slots = self.message.header.num_required_signatures as usize;
        self.signatures.resize(slots, [0u8; SIGNATURE_LEN]);

        for key in keys {
            let public_key = key.public_key();
            let slot = self
                .message
                .signers()
                .iter()
                .position(|signer| *signer == public_key)
                .ok_or_else(|| {
                    SolError::SigningError(format!(
                        "{public_key} not found in transaction signers"
                    ))
                })?;
            self.signatures[slot] = key.sign(&message_bytes);
        }

        Ok(())
    }

    /// Serialize into the wire format accepted by the network.
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let message = self.message.serialize()?;
        let mut wire = Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_LEN + message.len());
        wire.extend_from_slice(&compact_len(self.signatures.len(), "signatures")?);
        for sig in &self.signatures {
            wire.extend_from_slice(sig);
        }
        wire.extend_from_slice(&message);
        Ok(wire)
    }

    /// Parse a wire-format transaction.
    pub fn decode(wire: &[u8]) -> Result<Self, SolError> {
        let mut reader = WireReader::new(wire);
        let num_sigs = reader.read_compact_u16("signature count")?;
        let mut signatures = Vec::with_capacity(num_sigs);
        for _ in 0..num_sigs {
            signatures.push(reader.read_array("signature")?);
        }

        let message = Message::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(SolError::MalformedTransaction(format!(
                "{} trailing bytes after message",
                reader.remaining()
            )));
        }

        if signatures.len() != message.header.num_required_signatures as usize {
            return Err(SolError::MalformedTransaction(format!(
                "expected {} signatures, found {}",
                message.header.num_required_signatures,
                signatures.len()
            )));
        }

        Ok(Self {
            signatures,
            message,
        })
    }

    /// The fee payer's signature, used as the transaction id.
    pub fn id(&self) -> Result<TransactionId, SolError> {
        self.signatures
            .first()
            .map(|sig| TransactionId::new(*sig))
            .ok_or_else(|| SolError::MalformedTransaction("transaction has zero signatures".into()))
    }

    pub fn instructions(&self) -> Result<Vec<SolInstruction>, SolError> {
        self.message.decompile()
    }
}

/// Sign a compiled message and return the wire bytes ready for submission.
pub fn sign_transaction(message: &Message, keys: &[&PrivateKey]) -> Result<Vec<u8>, SolError> {
    let mut tx = Transaction::new_unsigned(message.clone());
    tx.sign(keys)?;
    tx.serialize()
}

/// Add our signature to a pre-built wire transaction.
///
/// The slot matching `private_key`'s public key is overwritten; every other
/// byte is preserved. Fails if the key is not one of the signers.
pub fn sign_raw_transaction(private_key: &PrivateKey, raw_tx: &[u8]) -> Result<Vec<u8>, SolError> {
    let mut tx = Transaction::decode(raw_tx)?;
    if tx.signatures.is_empty() {
        return Err(SolError::TransactionBuildError(
            "transaction has zero signatures".into(),
        ));
    }
    tx.sign(&[private_key])?;
    tx.serialize()
}

/// Read the id of a wire-format transaction without keeping the parse.
pub fn transaction_id(wire: &[u8]) -> Result<TransactionId, SolError> {
    Transaction::decode(wire)?.id()
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over wire bytes.
struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], SolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SolError::MalformedTransaction(format!("truncated {what}")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, SolError> {
        Ok(self.take(1, what)?[0])
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], SolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn read_compact_u16(&mut self, what: &str) -> Result<usize, SolError> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos..])
            .map_err(|e| SolError::MalformedTransaction(format!("{what}: {e}")))?;
        self.pos += consumed;
        Ok(value as usize)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
