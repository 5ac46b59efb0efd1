use thiserror::Error;

use crate::memo::BinaryMemo;

/// Errors raised while decoding a binary memo.
///
/// All of these are recoverable: a caller that cannot interpret a memo can
/// treat it as absent or opaque.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid memo length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("memo is not base64 text: {0}")]
    InvalidEncoding(String),

    /// The memo was written under a layout this codec cannot read, or a
    /// version outside the 4-bit field was requested.
    #[error("unsupported memo version: {0}")]
    UnknownVersion(u8),

    /// Non-fatal: `memo` holds every other field with the type set to
    /// [`TransferType::Unknown`](crate::memo::TransferType::Unknown).
    #[error("unknown transfer type tag: {tag}")]
    UnknownTransferType { tag: u8, memo: BinaryMemo },
}

impl DecodeError {
    /// Recover the memo from a non-fatal decode failure.
    pub fn into_lenient(self) -> Option<BinaryMemo> {
        match self {
            DecodeError::UnknownTransferType { memo, .. } => Some(memo),
            _ => None,
        }
    }
}

/// Invoice contents that fail the network's validation limits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error("line item title must be 1..={max} characters, got {actual}")]
    InvalidTitle { max: usize, actual: usize },

    #[error("line item description exceeds {max} characters (got {actual})")]
    DescriptionTooLong { max: usize, actual: usize },

    #[error("line item sku exceeds {max} bytes (got {actual})")]
    SkuTooLong { max: usize, actual: usize },

    #[error("line item amount {0} does not fit in a signed 64-bit integer")]
    AmountOutOfRange(u64),

    #[error("invoice must have 1..={max} line items, got {actual}")]
    InvalidItemCount { max: usize, actual: usize },

    #[error("invoice list must have 1..={max} invoices, got {actual}")]
    InvalidInvoiceCount { max: usize, actual: usize },
}

/// Failures binding invoices to the transfers of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("{transfers} transfers cannot bind {invoices} invoices")]
    CountMismatch { transfers: usize, invoices: usize },

    #[error("region {region}: memo foreign key does not match its invoices")]
    ForeignKeyMismatch {
        region: usize,
        expected: [u8; 23],
        actual: Option<[u8; 23]>,
    },

    #[error("region {region} references the invoices already bound by region {first_region}")]
    DuplicateInvoiceReference { region: usize, first_region: usize },

    #[error("region {region} carries an invoice reference but no invoices were supplied")]
    UnboundForeignKey { region: usize },
}
