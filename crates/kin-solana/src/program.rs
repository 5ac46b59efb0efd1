//! Instruction builders for the programs a Kin transaction touches.
//!
//! Only the commands the SDK needs are implemented: token transfers, creating
//! an associated token account, handing the close authority to a subsidizer,
//! closing an account, and memos. Associated account addresses are derived
//! without `spl-token` or `solana-sdk`.

use sha2::{Digest, Sha256};

use crate::address::PublicKey;
use crate::error::SolError;
use crate::transaction::{AccountMeta, SolInstruction};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// System Program: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: PublicKey = PublicKey::new([0u8; 32]);

/// SPL Token Program: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: PublicKey = PublicKey::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
]);

/// Associated Token Account Program: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: PublicKey = PublicKey::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
]);

/// Memo Program: `Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo`
pub const MEMO_PROGRAM_ID: PublicKey = PublicKey::new([
    0x05, 0x4a, 0x53, 0x50, 0xf8, 0x5d, 0xc8, 0x82, 0xd6, 0x14, 0xa5, 0x56, 0x72, 0x78, 0x8a,
    0x29, 0x6d, 0xdf, 0x1e, 0xab, 0xab, 0xd0, 0xa6, 0x06, 0x78, 0x88, 0x49, 0x32, 0xf4, 0xee,
    0xf6, 0xa0,
]);

/// Rent sysvar: `SysvarRent111111111111111111111111111111111`
pub const SYSVAR_RENT_ID: PublicKey = PublicKey::new([
    0x06, 0xa7, 0xd5, 0x17, 0x19, 0x2c, 0x5c, 0x51, 0x21, 0x8c, 0xc9, 0x4c, 0x3d, 0x4a, 0xf1,
    0x7f, 0x58, 0xda, 0xee, 0x08, 0x9b, 0xa1, 0xfd, 0x44, 0xe3, 0xdb, 0xd9, 0x8a, 0x00, 0x00,
    0x00, 0x00,
]);

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Token program command tags (first data byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenCommand {
    Transfer = 3,
    SetAuthority = 6,
    CloseAccount = 9,
}

/// `SetAuthority` authority kinds; Kin only hands over the close authority.
pub const AUTHORITY_TYPE_CLOSE_ACCOUNT: u8 = 3;

// ---------------------------------------------------------------------------
// Token program
// ---------------------------------------------------------------------------

/// Build a token `Transfer` of `amount` quarks.
///
/// Data is the command byte followed by the u64 LE amount (9 bytes).
pub fn token_transfer(
    source: &PublicKey,
    destination: &PublicKey,
    owner: &PublicKey,
    amount: u64,
) -> Result<SolInstruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(TokenCommand::Transfer as u8);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*source, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*owner, true),
        ],
        data,
    })
}

/// Hand (or revoke, with `None`) the close authority of a token account.
pub fn set_close_authority(
    account: &PublicKey,
    current_authority: &PublicKey,
    new_authority: Option<&PublicKey>,
) -> SolInstruction {
    let mut data = vec![
        TokenCommand::SetAuthority as u8,
        AUTHORITY_TYPE_CLOSE_ACCOUNT,
        0,
    ];
    if let Some(authority) = new_authority {
        data[2] = 1;
        data.extend_from_slice(authority.as_bytes());
    }

    SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*account, false),
            AccountMeta::readonly(*current_authority, true),
        ],
        data,
    }
}

/// Close a zero-balance token account, releasing its rent to `destination`.
pub fn close_account(
    account: &PublicKey,
    destination: &PublicKey,
    owner: &PublicKey,
) -> SolInstruction {
    SolInstruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*account, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*owner, true),
        ],
        data: vec![TokenCommand::CloseAccount as u8],
    }
}

// ---------------------------------------------------------------------------
// Associated token accounts
// ---------------------------------------------------------------------------

/// Create the associated token account of `owner` for `mint`, paid for by
/// `subsidizer`. Returns the instruction and the new account's address.
pub fn create_associated_account(
    subsidizer: &PublicKey,
    owner: &PublicKey,
    mint: &PublicKey,
) -> Result<(SolInstruction, PublicKey), SolError> {
    let address = derive_associated_token_address(owner, mint)?;
    let ix = SolInstruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*subsidizer, true),
            AccountMeta::writable(address, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::readonly(SYSVAR_RENT_ID, false),
        ],
        data: Vec::new(),
    };
    Ok((ix, address))
}

/// Derive the associated token account address for a wallet + mint pair.
///
/// The ATA is a Program Derived Address with seeds
/// `[wallet, token_program_id, mint]` under the Associated Token program.
pub fn derive_associated_token_address(
    wallet: &PublicKey,
    mint: &PublicKey,
) -> Result<PublicKey, SolError> {
    find_program_address(
        &[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Iterate bump seeds from 255 down to 0, returning the first
/// `SHA-256(seeds || bump || program_id || "ProgramDerivedAddress")` that is
/// NOT a valid Ed25519 point.
fn find_program_address(
    seeds: &[&[u8]],
    program_id: &PublicKey,
) -> Result<(PublicKey, u8), SolError> {
    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let hash: [u8; 32] = hasher.finalize().into();

        if !is_on_curve(&hash) {
            return Ok((PublicKey::new(hash), bump));
        }
    }

    Err(SolError::InvalidAddress(
        "could not find valid PDA bump seed".into(),
    ))
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

// ---------------------------------------------------------------------------
// Memo program
// ---------------------------------------------------------------------------

/// A memo instruction carrying `data` verbatim. It references no accounts.
pub fn memo_instruction(data: &[u8]) -> SolInstruction {
    SolInstruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: Vec::new(),
        data: data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    #[test]
    fn program_ids_match_base58() {
        assert_eq!(
            TOKEN_PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
        assert_eq!(
            MEMO_PROGRAM_ID.to_string(),
            "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo"
        );
        assert_eq!(
            SYSVAR_RENT_ID.to_string(),
            "SysvarRent111111111111111111111111111111111"
        );
    }

    // -- Token program -------------------------------------------------------

    #[test]
    fn transfer_data_encoding() {
        let ix = token_transfer(&key(1), &key(2), &key(3), 500_000).unwrap();
        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
        assert_eq!(ix.data.len(), 9);
        assert_eq!(ix.data[0], 3);
        assert_eq!(u64::from_le_bytes(ix.data[1..9].try_into().unwrap()), 500_000);
    }

    #[test]
    fn transfer_account_roles() {
        let ix = token_transfer(&key(1), &key(2), &key(3), 100).unwrap();
        assert_eq!(ix.accounts.len(), 3);
        assert!(ix.accounts[0].is_writable && !ix.accounts[0].is_signer);
        assert!(ix.accounts[1].is_writable && !ix.accounts[1].is_signer);
        assert!(ix.accounts[2].is_signer && !ix.accounts[2].is_writable);
    }

    #[test]
    fn transfer_zero_amount_fails() {
        assert!(token_transfer(&key(1), &key(2), &key(3), 0).is_err());
    }

    #[test]
    fn set_close_authority_encodes_new_authority() {
        let ix = set_close_authority(&key(1), &key(2), Some(&key(7)));
        assert_eq!(&ix.data[..3], &[6, 3, 1]);
        assert_eq!(&ix.data[3..], key(7).as_bytes());

        let revoke = set_close_authority(&key(1), &key(2), None);
        assert_eq!(revoke.data, vec![6, 3, 0]);
    }

    #[test]
    fn close_account_layout() {
        let ix = close_account(&key(1), &key(2), &key(3));
        assert_eq!(ix.data, vec![9]);
        assert_eq!(ix.accounts[2].pubkey, key(3));
        assert!(ix.accounts[2].is_signer);
    }

    // -- Associated accounts -------------------------------------------------

    #[test]
    fn pda_is_not_on_curve_and_deterministic() {
        let a = derive_associated_token_address(&key(0xAA), &key(0xBB)).unwrap();
        let b = derive_associated_token_address(&key(0xAA), &key(0xBB)).unwrap();
        assert_eq!(a, b);
        assert!(!is_on_curve(a.as_bytes()));
    }

    #[test]
    fn pda_differs_per_owner_and_mint() {
        let base = derive_associated_token_address(&key(1), &key(0xFF)).unwrap();
        assert_ne!(base, derive_associated_token_address(&key(2), &key(0xFF)).unwrap());
        assert_ne!(base, derive_associated_token_address(&key(1), &key(0xFE)).unwrap());
    }

    #[test]
    fn create_associated_account_targets_derived_address() {
        let (ix, address) = create_associated_account(&key(9), &key(1), &key(5)).unwrap();
        assert_eq!(ix.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.accounts[0].pubkey, key(9));
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[1].pubkey, address);
        assert_eq!(ix.accounts[2].pubkey, key(1));
        assert_eq!(ix.accounts[3].pubkey, key(5));
        assert!(ix.data.is_empty());
    }

    #[test]
    fn is_on_curve_accepts_basepoint() {
        let basepoint: [u8; 32] = [
            0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66,
        ];
        assert!(is_on_curve(&basepoint));
    }

    // -- Memo ----------------------------------------------------------------

    #[test]
    fn memo_carries_data_verbatim() {
        let ix = memo_instruction(b"hello");
        assert_eq!(ix.program_id, MEMO_PROGRAM_ID);
        assert!(ix.accounts.is_empty());
        assert_eq!(ix.data, b"hello");
    }
}
