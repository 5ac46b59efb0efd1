//! Invoices and their canonical digest.
//!
//! The digest binds the on-chain memo to off-chain invoice data, so the
//! encoding below must match the bytes the server hashes: the proto3 wire
//! encoding of `kin.agora.common.v3.InvoiceList`.
//!
//! ```text
//! InvoiceList { repeated Invoice invoices = 1; }
//! Invoice     { repeated LineItem items = 1; }
//! LineItem    { string title = 1; string description = 2; int64 amount = 3; bytes sku = 4; }
//! ```
//!
//! Fields are written in field-number order and default values are
//! omitted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::error::InvoiceError;
use crate::memo::FOREIGN_KEY_LEN;

pub const MAX_TITLE_CHARS: usize = 128;
pub const MAX_DESCRIPTION_CHARS: usize = 256;
pub const MAX_SKU_BYTES: usize = 128;
pub const MAX_LINE_ITEMS: usize = 1024;
pub const MAX_INVOICES: usize = 100;

/// SHA-224 output width.
pub const DIGEST_LEN: usize = 28;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LineItemRecord")]
pub struct LineItem {
    title: String,
    description: Option<String>,
    /// Quarks.
    amount: u64,
    sku: Option<Vec<u8>>,
}

impl LineItem {
    pub fn new(
        title: impl Into<String>,
        description: Option<String>,
        amount: u64,
        sku: Option<Vec<u8>>,
    ) -> Result<Self, InvoiceError> {
        let title = title.into();
        let title_chars = title.chars().count();
        if title_chars == 0 || title_chars > MAX_TITLE_CHARS {
            return Err(InvoiceError::InvalidTitle {
                max: MAX_TITLE_CHARS,
                actual: title_chars,
            });
        }
        if let Some(description) = &description {
            let chars = description.chars().count();
            if chars > MAX_DESCRIPTION_CHARS {
                return Err(InvoiceError::DescriptionTooLong {
                    max: MAX_DESCRIPTION_CHARS,
                    actual: chars,
                });
            }
        }
        if let Some(sku) = &sku {
            if sku.len() > MAX_SKU_BYTES {
                return Err(InvoiceError::SkuTooLong {
                    max: MAX_SKU_BYTES,
                    actual: sku.len(),
                });
            }
        }
        if amount > i64::MAX as u64 {
            return Err(InvoiceError::AmountOutOfRange(amount));
        }

        Ok(Self {
            title,
            description,
            amount,
            sku,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn sku(&self) -> Option<&[u8]> {
        self.sku.as_deref()
    }
}

#[derive(Deserialize)]
struct LineItemRecord {
    title: String,
    #[serde(default)]
    description: Option<String>,
    amount: u64,
    #[serde(default)]
    sku: Option<Vec<u8>>,
}

impl TryFrom<LineItemRecord> for LineItem {
    type Error = InvoiceError;

    fn try_from(r: LineItemRecord) -> Result<Self, Self::Error> {
        LineItem::new(r.title, r.description, r.amount, r.sku)
    }
}

/// An itemised receipt for one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Invoice {
    items: Vec<LineItem>,
}

impl Invoice {
    pub fn new(items: Vec<LineItem>) -> Result<Self, InvoiceError> {
        if items.is_empty() || items.len() > MAX_LINE_ITEMS {
            return Err(InvoiceError::InvalidItemCount {
                max: MAX_LINE_ITEMS,
                actual: items.len(),
            });
        }
        Ok(Self { items })
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Sum of line item amounts, saturating.
    pub fn total(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.amount))
    }

    /// The invoice id: SHA-224 of this invoice's encoding.
    pub fn id(&self) -> [u8; DIGEST_LEN] {
        invoice_digest(self)
    }
}

impl TryFrom<Vec<LineItem>> for Invoice {
    type Error = InvoiceError;

    fn try_from(items: Vec<LineItem>) -> Result<Self, Self::Error> {
        Invoice::new(items)
    }
}

impl From<Invoice> for Vec<LineItem> {
    fn from(invoice: Invoice) -> Self {
        invoice.items
    }
}

/// Invoices for the transfers of one transaction, in transfer order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Invoice>", into = "Vec<Invoice>")]
pub struct InvoiceList {
    invoices: Vec<Invoice>,
}

impl InvoiceList {
    pub fn new(invoices: Vec<Invoice>) -> Result<Self, InvoiceError> {
        if invoices.is_empty() || invoices.len() > MAX_INVOICES {
            return Err(InvoiceError::InvalidInvoiceCount {
                max: MAX_INVOICES,
                actual: invoices.len(),
            });
        }
        Ok(Self { invoices })
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }

    /// A list holding `invoices[start..end]`, or `None` for an empty or
    /// out-of-range window.
    pub(crate) fn window(&self, start: usize, end: usize) -> Option<Self> {
        let slice = self.invoices.get(start..end)?;
        if slice.is_empty() {
            return None;
        }
        Some(Self {
            invoices: slice.to_vec(),
        })
    }
}

impl TryFrom<Vec<Invoice>> for InvoiceList {
    type Error = InvoiceError;

    fn try_from(invoices: Vec<Invoice>) -> Result<Self, Self::Error> {
        InvoiceList::new(invoices)
    }
}

impl From<InvoiceList> for Vec<Invoice> {
    fn from(list: InvoiceList) -> Self {
        list.invoices
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-224 of the list's canonical encoding.
pub fn digest(list: &InvoiceList) -> [u8; DIGEST_LEN] {
    Sha224::digest(encode_invoice_list(list)).into()
}

/// The first 23 bytes of [`digest`], as carried in a memo.
pub fn foreign_key(list: &InvoiceList) -> [u8; FOREIGN_KEY_LEN] {
    let mut key = [0u8; FOREIGN_KEY_LEN];
    key.copy_from_slice(&digest(list)[..FOREIGN_KEY_LEN]);
    key
}

pub fn invoice_digest(invoice: &Invoice) -> [u8; DIGEST_LEN] {
    Sha224::digest(encode_invoice(invoice)).into()
}

// ---------------------------------------------------------------------------
// Canonical encoding
// ---------------------------------------------------------------------------

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;

pub fn encode_invoice_list(list: &InvoiceList) -> Vec<u8> {
    let mut out = Vec::new();
    for invoice in &list.invoices {
        put_bytes_field(&mut out, 1, &encode_invoice(invoice));
    }
    out
}

pub fn encode_invoice(invoice: &Invoice) -> Vec<u8> {
    let mut out = Vec::new();
    for item in &invoice.items {
        put_bytes_field(&mut out, 1, &encode_line_item(item));
    }
    out
}

pub fn encode_line_item(item: &LineItem) -> Vec<u8> {
    let mut out = Vec::new();
    if !item.title.is_empty() {
        put_bytes_field(&mut out, 1, item.title.as_bytes());
    }
    if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
        put_bytes_field(&mut out, 2, description.as_bytes());
    }
    if item.amount != 0 {
        put_key(&mut out, 3, WIRE_VARINT);
        put_varint(&mut out, item.amount);
    }
    if let Some(sku) = item.sku.as_deref().filter(|s| !s.is_empty()) {
        put_bytes_field(&mut out, 4, sku);
    }
    out
}

fn put_key(out: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(out, u64::from(field << 3 | u32::from(wire_type)));
}

fn put_bytes_field(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(out, field, WIRE_LEN);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
