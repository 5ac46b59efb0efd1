//! Ledger primitives for the Kin SDK.
//!
//! Kin runs on Solana. This crate covers the subset of the ledger the SDK
//! needs: Base58 account addresses, Ed25519 keys, the compact transaction
//! wire format (build, sign, decode), the token and memo program
//! instructions Kin payments use, and classification of raw instructions
//! into a typed [`Instruction`].
//!
//! The wire format is implemented by hand on top of `ed25519-dalek` and
//! `bs58` rather than through `solana-sdk`.

pub mod address;
pub mod error;
pub mod instruction;
pub mod keys;
pub mod program;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use address::{validate_address, PublicKey, PUBLIC_KEY_LEN};
pub use error::SolError;
pub use instruction::{classify, classify_all, classify_envelope, Instruction, Memo};
pub use keys::{verify_signature, PrivateKey};
pub use program::{
    close_account, create_associated_account, derive_associated_token_address, memo_instruction,
    set_close_authority, token_transfer, ASSOCIATED_TOKEN_PROGRAM_ID, MEMO_PROGRAM_ID,
    SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    compile_transaction, decode_compact_u16, encode_compact_u16, sign_raw_transaction,
    sign_transaction, transaction_id, AccountMeta, CompiledInstruction, Message, MessageHeader,
    SolInstruction, Transaction, TransactionId, SIGNATURE_LEN,
};
