//! Memo and invoice binding for Kin transactions.
//!
//! A Kin payment can reference an off-chain invoice. The reference is a
//! fixed-width binary memo placed before the transfers it describes, whose
//! foreign key is a truncated SHA-224 of the invoices. This crate encodes and
//! decodes those memos, hashes invoices, splits a transaction into
//! memo-anchored regions and checks that invoices and transfers line up.

pub mod binding;
pub mod error;
pub mod invoice;
pub mod memo;
pub mod region;

use kin_solana::Instruction;

pub use binding::{bind, BoundRegion};
pub use error::{BindingError, DecodeError, InvoiceError};
pub use invoice::{digest, foreign_key, invoice_digest, Invoice, InvoiceList, LineItem};
pub use memo::{BinaryMemo, TransferType, CURRENT_VERSION, FOREIGN_KEY_LEN, MEMO_LEN};
pub use region::{flatten, resolve, Region};

/// Encode a current-version memo for `invoices`.
///
/// Without invoices the foreign key is all zeroes.
pub fn build_memo(
    invoices: Option<&InvoiceList>,
    transfer_type: TransferType,
    app_index: u16,
) -> [u8; MEMO_LEN] {
    let key = invoices.map(foreign_key).unwrap_or([0u8; FOREIGN_KEY_LEN]);
    BinaryMemo::current(transfer_type, app_index, key).encode()
}

/// Resolve `instructions` into regions and bind `invoices` to them.
pub fn resolve_and_validate(
    instructions: &[Instruction],
    invoices: Option<&InvoiceList>,
) -> Result<Vec<BoundRegion>, BindingError> {
    bind(&resolve(instructions), invoices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_memo_without_invoices_has_zero_key() {
        let memo = BinaryMemo::decode(&build_memo(None, TransferType::P2p, 3)).unwrap();
        assert!(!memo.has_foreign_key());
        assert_eq!(memo.version(), CURRENT_VERSION);
        assert_eq!(memo.app_index(), 3);
    }

    #[test]
    fn build_memo_carries_foreign_key() {
        let list = InvoiceList::new(vec![
            Invoice::new(vec![LineItem::new("Test Item", None, 10, None).unwrap()]).unwrap(),
        ])
        .unwrap();
        let memo = BinaryMemo::decode(&build_memo(Some(&list), TransferType::Spend, 1)).unwrap();
        assert_eq!(memo.foreign_key(), &foreign_key(&list));
        assert_eq!(memo.transfer_type(), TransferType::Spend);
    }
}
