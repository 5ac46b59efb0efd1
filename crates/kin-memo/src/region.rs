//! Partitioning of an instruction sequence into memo-anchored regions.

use kin_solana::{Instruction, Memo};

/// A run of instructions following (and owned by) at most one memo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    pub anchor: Option<Memo>,
    /// Never contains a memo instruction.
    pub instructions: Vec<Instruction>,
}

impl Region {
    pub fn transfer_count(&self) -> usize {
        self.instructions.iter().filter(|ix| ix.is_transfer()).count()
    }

    pub fn transfers(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().filter(|ix| ix.is_transfer())
    }
}

/// Split `instructions` into regions.
///
/// Every memo opens a new region and becomes its anchor. Instructions before
/// the first memo form a leading region without an anchor. Back-to-back
/// memos leave the earlier one with an empty region.
pub fn resolve(instructions: &[Instruction]) -> Vec<Region> {
    let mut regions: Vec<Region> = Vec::new();

    for ix in instructions {
        match ix {
            Instruction::Memo(memo) => regions.push(Region {
                anchor: Some(memo.clone()),
                instructions: Vec::new(),
            }),
            other => match regions.last_mut() {
                Some(current) => current.instructions.push(other.clone()),
                None => regions.push(Region {
                    anchor: None,
                    instructions: vec![other.clone()],
                }),
            },
        }
    }

    regions
}

/// Inverse of [`resolve`]: the original instruction sequence.
pub fn flatten(regions: &[Region]) -> Vec<Instruction> {
    let mut out = Vec::new();
    for region in regions {
        if let Some(memo) = &region.anchor {
            out.push(Instruction::Memo(memo.clone()));
        }
        out.extend(region.instructions.iter().cloned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kin_solana::{PublicKey, SolInstruction, SYSTEM_PROGRAM_ID};
    use rand::Rng;

    fn memo(tag: u8) -> Instruction {
        Instruction::Memo(Memo { data: vec![tag] })
    }

    fn transfer(amount: u64) -> Instruction {
        Instruction::Transfer {
            source: PublicKey::new([1; 32]),
            destination: PublicKey::new([2; 32]),
            owner: PublicKey::new([3; 32]),
            amount,
        }
    }

    fn close() -> Instruction {
        Instruction::CloseAccount {
            account: PublicKey::new([4; 32]),
            destination: PublicKey::new([3; 32]),
            owner: PublicKey::new([3; 32]),
        }
    }

    fn other() -> Instruction {
        Instruction::Unrecognized(SolInstruction {
            program_id: SYSTEM_PROGRAM_ID,
            accounts: vec![],
            data: vec![0],
        })
    }

    #[test]
    fn empty_input_has_no_regions() {
        assert!(resolve(&[]).is_empty());
    }

    #[test]
    fn leading_instructions_form_anchorless_region() {
        let regions = resolve(&[transfer(1), memo(0), transfer(2)]);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].anchor.is_none());
        assert_eq!(regions[0].instructions, vec![transfer(1)]);
        assert_eq!(regions[1].anchor, Some(Memo { data: vec![0] }));
        assert_eq!(regions[1].instructions, vec![transfer(2)]);
    }

    #[test]
    fn consecutive_memos_leave_empty_region() {
        let regions = resolve(&[memo(0), memo(1), transfer(5)]);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].instructions.is_empty());
        assert_eq!(regions[1].transfer_count(), 1);
    }

    #[test]
    fn memo_first_has_no_leading_region() {
        let regions = resolve(&[memo(0), transfer(1), close()]);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].instructions.len(), 2);
        assert_eq!(regions[0].transfer_count(), 1);
    }

    #[test]
    fn transfers_skips_non_transfers() {
        let regions = resolve(&[memo(0), close(), transfer(1), other(), transfer(2)]);
        let amounts: Vec<u64> = regions[0]
            .transfers()
            .filter_map(Instruction::transfer_amount)
            .collect();
        assert_eq!(amounts, vec![1, 2]);
    }

    #[test]
    fn flatten_inverts_resolve_for_random_sequences() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..24);
            let seq: Vec<Instruction> = (0..len)
                .map(|i| match rng.gen_range(0..4) {
                    0 => memo(i as u8),
                    1 => transfer(i as u64 + 1),
                    2 => close(),
                    _ => other(),
                })
                .collect();

            let regions = resolve(&seq);
            assert_eq!(flatten(&regions), seq);
            assert_eq!(resolve(&flatten(&regions)), regions);
            for region in &regions {
                assert!(region.instructions.iter().all(|ix| !ix.is_memo()));
            }
        }
    }
}
