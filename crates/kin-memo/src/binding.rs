//! Binding invoices to the transfers of a transaction.
//!
//! Invoices are handed out in order: the first region with transfers takes
//! as many invoices as it has transfers, the next region takes the next
//! ones, and so on. A region that takes invoices must be anchored by a
//! binary memo whose foreign key is the key of exactly those invoices.

use std::collections::HashMap;

use kin_solana::Memo;
use tracing::debug;

use crate::error::BindingError;
use crate::invoice::{foreign_key, InvoiceList};
use crate::memo::{BinaryMemo, FOREIGN_KEY_LEN};
use crate::region::Region;

/// A region together with what its anchor decoded to and the invoices
/// assigned to its transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRegion {
    pub region: Region,
    /// `None` when there is no anchor or it is not a binary memo.
    pub memo: Option<BinaryMemo>,
    pub invoices: Option<InvoiceList>,
}

/// Validate the invoice binding of `regions`.
pub fn bind(
    regions: &[Region],
    invoices: Option<&InvoiceList>,
) -> Result<Vec<BoundRegion>, BindingError> {
    match invoices {
        None => bind_unbound(regions),
        Some(list) => bind_invoices(regions, list),
    }
}

fn bind_unbound(regions: &[Region]) -> Result<Vec<BoundRegion>, BindingError> {
    regions
        .iter()
        .enumerate()
        .map(|(index, region)| {
            let memo = region.anchor.as_ref().and_then(decode_anchor);
            if region.transfer_count() > 0 && memo.is_some_and(|m| m.has_foreign_key()) {
                debug!(region = index, "memo references invoices that were not supplied");
                return Err(BindingError::UnboundForeignKey { region: index });
            }
            Ok(BoundRegion {
                region: region.clone(),
                memo,
                invoices: None,
            })
        })
        .collect()
}

fn bind_invoices(
    regions: &[Region],
    list: &InvoiceList,
) -> Result<Vec<BoundRegion>, BindingError> {
    let transfers: usize = regions.iter().map(Region::transfer_count).sum();
    if transfers != list.len() {
        debug!(transfers, invoices = list.len(), "invoice count mismatch");
        return Err(BindingError::CountMismatch {
            transfers,
            invoices: list.len(),
        });
    }

    let mut next = 0usize;
    let mut claimed: HashMap<[u8; FOREIGN_KEY_LEN], usize> = HashMap::new();
    let mut bound = Vec::with_capacity(regions.len());

    for (index, region) in regions.iter().enumerate() {
        let memo = region.anchor.as_ref().and_then(decode_anchor);
        let count = region.transfer_count();
        if count == 0 {
            bound.push(BoundRegion {
                region: region.clone(),
                memo,
                invoices: None,
            });
            continue;
        }

        // Counts were checked above, so the window is always in range.
        let assigned = list
            .window(next, next + count)
            .ok_or(BindingError::CountMismatch {
                transfers,
                invoices: list.len(),
            })?;
        next += count;

        let expected = foreign_key(&assigned);
        let actual = memo.map(|m| *m.foreign_key());

        // Keys are content hashes, so two regions billing identical invoices
        // share a key. A key is still only redeemable once per transaction.
        if let Some(key) = actual {
            if let Some(&first_region) = claimed.get(&key) {
                debug!(region = index, first_region, "duplicate invoice reference");
                return Err(BindingError::DuplicateInvoiceReference {
                    region: index,
                    first_region,
                });
            }
            claimed.insert(key, index);
        }

        if actual != Some(expected) {
            debug!(region = index, has_memo = memo.is_some(), "foreign key mismatch");
            return Err(BindingError::ForeignKeyMismatch {
                region: index,
                expected,
                actual,
            });
        }

        bound.push(BoundRegion {
            region: region.clone(),
            memo,
            invoices: Some(assigned),
        });
    }

    Ok(bound)
}

/// Decode an anchor leniently: unknown transfer types still yield a memo,
/// anything else that is not a binary memo yields `None`.
fn decode_anchor(anchor: &Memo) -> Option<BinaryMemo> {
    match BinaryMemo::from_instruction_data(&anchor.data) {
        Ok(memo) => Some(memo),
        Err(err) => err.into_lenient(),
    }
}
