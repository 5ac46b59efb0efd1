//! Typed view over the instructions of a Kin transaction.
//!
//! Raw [`SolInstruction`]s are classified into the handful of commands the
//! memo binding logic has to recognise. Anything else is kept as
//! [`Instruction::Unrecognized`] so that positions in the sequence survive.

use crate::address::PublicKey;
use crate::error::SolError;
use crate::program::{
    TokenCommand, ASSOCIATED_TOKEN_PROGRAM_ID, AUTHORITY_TYPE_CLOSE_ACCOUNT, MEMO_PROGRAM_ID,
    TOKEN_PROGRAM_ID,
};
use crate::transaction::{SolInstruction, Transaction};

/// Raw payload of a memo instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memo {
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Transfer {
        source: PublicKey,
        destination: PublicKey,
        owner: PublicKey,
        amount: u64,
    },
    CreateAssociatedAccount {
        subsidizer: PublicKey,
        new_account: PublicKey,
        owner: PublicKey,
        mint: PublicKey,
    },
    SetCloseAuthority {
        account: PublicKey,
        current_authority: PublicKey,
        new_authority: Option<PublicKey>,
    },
    CloseAccount {
        account: PublicKey,
        destination: PublicKey,
        owner: PublicKey,
    },
    Memo(Memo),
    Unrecognized(SolInstruction),
}

impl Instruction {
    pub fn is_memo(&self) -> bool {
        matches!(self, Instruction::Memo(_))
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, Instruction::Transfer { .. })
    }

    /// Quarks moved by a transfer; `None` for every other instruction.
    pub fn transfer_amount(&self) -> Option<u64> {
        match self {
            Instruction::Transfer { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

/// Classify one raw instruction.
pub fn classify(ix: &SolInstruction) -> Instruction {
    let account = |i: usize| ix.accounts.get(i).map(|meta| meta.pubkey);

    if ix.program_id == MEMO_PROGRAM_ID {
        return Instruction::Memo(Memo {
            data: ix.data.clone(),
        });
    }

    if ix.program_id == ASSOCIATED_TOKEN_PROGRAM_ID {
        if let (Some(subsidizer), Some(new_account), Some(owner), Some(mint)) =
            (account(0), account(1), account(2), account(3))
        {
            return Instruction::CreateAssociatedAccount {
                subsidizer,
                new_account,
                owner,
                mint,
            };
        }
    }

    if ix.program_id == TOKEN_PROGRAM_ID {
        match ix.data.first().copied() {
            Some(tag) if tag == TokenCommand::Transfer as u8 && ix.data.len() == 9 => {
                if let (Some(source), Some(destination), Some(owner)) =
                    (account(0), account(1), account(2))
                {
                    let mut amount = [0u8; 8];
                    amount.copy_from_slice(&ix.data[1..9]);
                    return Instruction::Transfer {
                        source,
                        destination,
                        owner,
                        amount: u64::from_le_bytes(amount),
                    };
                }
            }
            Some(tag)
                if tag == TokenCommand::SetAuthority as u8
                    && ix.data.get(1) == Some(&AUTHORITY_TYPE_CLOSE_ACCOUNT) =>
            {
                if let (Some(target), Some(current_authority)) = (account(0), account(1)) {
                    let new_authority = match ix.data.get(2) {
                        Some(1) => ix
                            .data
                            .get(3..35)
                            .and_then(|bytes| PublicKey::from_slice(bytes).ok()),
                        _ => None,
                    };
                    return Instruction::SetCloseAuthority {
                        account: target,
                        current_authority,
                        new_authority,
                    };
                }
            }
            Some(tag) if tag == TokenCommand::CloseAccount as u8 => {
                if let (Some(target), Some(destination), Some(owner)) =
                    (account(0), account(1), account(2))
                {
                    return Instruction::CloseAccount {
                        account: target,
                        destination,
                        owner,
                    };
                }
            }
            _ => {}
        }
    }

    Instruction::Unrecognized(ix.clone())
}

pub fn classify_all(instructions: &[SolInstruction]) -> Vec<Instruction> {
    instructions.iter().map(classify).collect()
}

/// Decode a wire transaction and classify its instructions in order.
pub fn classify_envelope(wire: &[u8]) -> Result<Vec<Instruction>, SolError> {
    let tx = Transaction::decode(wire)?;
    Ok(classify_all(&tx.instructions()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;
    use crate::program::{
        close_account, create_associated_account, memo_instruction, set_close_authority,
        token_transfer, SYSTEM_PROGRAM_ID,
    };
    use crate::transaction::{compile_transaction, sign_transaction};

    fn key(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    #[test]
    fn classifies_transfer() {
        let ix = token_transfer(&key(1), &key(2), &key(3), 42).unwrap();
        assert_eq!(
            classify(&ix),
            Instruction::Transfer {
                source: key(1),
                destination: key(2),
                owner: key(3),
                amount: 42,
            }
        );
        assert_eq!(classify(&ix).transfer_amount(), Some(42));
    }

    #[test]
    fn classifies_memo() {
        let got = classify(&memo_instruction(b"abc"));
        assert!(got.is_memo());
        assert_eq!(got, Instruction::Memo(Memo { data: b"abc".to_vec() }));
    }

    #[test]
    fn classifies_account_lifecycle_commands() {
        let (create, ata) = create_associated_account(&key(9), &key(1), &key(5)).unwrap();
        assert_eq!(
            classify(&create),
            Instruction::CreateAssociatedAccount {
                subsidizer: key(9),
                new_account: ata,
                owner: key(1),
                mint: key(5),
            }
        );

        assert_eq!(
            classify(&set_close_authority(&ata, &key(1), Some(&key(9)))),
            Instruction::SetCloseAuthority {
                account: ata,
                current_authority: key(1),
                new_authority: Some(key(9)),
            }
        );

        assert_eq!(
            classify(&close_account(&ata, &key(9), &key(1))),
            Instruction::CloseAccount {
                account: ata,
                destination: key(9),
                owner: key(1),
            }
        );
    }

    #[test]
    fn unknown_programs_and_commands_are_kept() {
        let system = SolInstruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![],
            data: vec![2, 0, 0, 0],
        };
        assert_eq!(classify(&system), Instruction::Unrecognized(system.clone()));

        // Token Approve (tag 4) is not something we interpret.
        let approve = SolInstruction {
            program_id: TOKEN_PROGRAM_ID,
            accounts: vec![],
            data: vec![4, 1, 0, 0, 0, 0, 0, 0, 0],
        };
        assert!(matches!(classify(&approve), Instruction::Unrecognized(_)));
    }

    #[test]
    fn truncated_transfer_is_unrecognized() {
        let mut ix = token_transfer(&key(1), &key(2), &key(3), 42).unwrap();
        ix.data.truncate(5);
        assert!(!classify(&ix).is_transfer());
    }

    #[test]
    fn classify_envelope_preserves_order() {
        let owner = PrivateKey::from_bytes([0x42; 32]);
        let ixs = vec![
            memo_instruction(b"first"),
            token_transfer(&key(1), &key(2), &owner.public_key(), 10).unwrap(),
            memo_instruction(b"second"),
        ];
        let msg = compile_transaction(&ixs, &owner.public_key(), &[0u8; 32]).unwrap();
        let wire = sign_transaction(&msg, &[&owner]).unwrap();

        let classified = classify_envelope(&wire).unwrap();
        assert_eq!(classified.len(), 3);
        assert!(classified[0].is_memo());
        assert!(classified[1].is_transfer());
        assert!(classified[2].is_memo());
    }
}
