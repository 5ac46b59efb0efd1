//! Fixed-width binary memo.
//!
//! Every Kin memo is exactly [`MEMO_LEN`] bytes, the width of the ledger's
//! hash memo. The first four bytes are a little-endian header whose fields
//! are packed from the least significant bit upwards:
//!
//! ```text
//! bits  0..2    magic (always 0b01)
//! bits  2..6    version
//! bits  6..11   transfer type
//! bits 11..27   app index
//! bits 27..32   reserved, zero
//! bytes 4..27   foreign key
//! bytes 27..32  reserved, zero
//! ```
//!
//! On the ledger the memo instruction carries the Base64 text of the bytes.

use crate::error::DecodeError;

pub const MEMO_LEN: usize = 32;
pub const FOREIGN_KEY_LEN: usize = 23;

/// Highest memo version this codec writes.
pub const CURRENT_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 0x0f;

const MAGIC: u32 = 0b01;
const MAGIC_MASK: u32 = 0b11;
const VERSION_SHIFT: u32 = 2;
const VERSION_MASK: u32 = 0x0f;
const TYPE_SHIFT: u32 = 6;
const TYPE_MASK: u32 = 0x1f;
const APP_INDEX_SHIFT: u32 = 11;
const APP_INDEX_MASK: u32 = 0xffff;
const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferType {
    /// Unspecified, or a tag this codec does not know.
    #[default]
    Unknown = 0,
    /// The app pays a user.
    Earn = 1,
    /// A user pays the app.
    Spend = 2,
    /// User to user.
    P2p = 3,
}

impl TransferType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TransferType::Unknown),
            1 => Some(TransferType::Earn),
            2 => Some(TransferType::Spend),
            3 => Some(TransferType::P2p),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryMemo {
    version: u8,
    transfer_type: TransferType,
    app_index: u16,
    foreign_key: [u8; FOREIGN_KEY_LEN],
}

impl BinaryMemo {
    /// Build a memo, rejecting versions that do not fit the 4-bit field.
    pub fn new(
        version: u8,
        transfer_type: TransferType,
        app_index: u16,
        foreign_key: [u8; FOREIGN_KEY_LEN],
    ) -> Result<Self, DecodeError> {
        if version > MAX_VERSION {
            return Err(DecodeError::UnknownVersion(version));
        }
        Ok(Self {
            version,
            transfer_type,
            app_index,
            foreign_key,
        })
    }

    /// A memo at [`CURRENT_VERSION`].
    pub fn current(
        transfer_type: TransferType,
        app_index: u16,
        foreign_key: [u8; FOREIGN_KEY_LEN],
    ) -> Self {
        Self {
            version: CURRENT_VERSION,
            transfer_type,
            app_index,
            foreign_key,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn app_index(&self) -> u16 {
        self.app_index
    }

    pub fn foreign_key(&self) -> &[u8; FOREIGN_KEY_LEN] {
        &self.foreign_key
    }

    /// True when the memo references invoices (non-zero foreign key).
    pub fn has_foreign_key(&self) -> bool {
        self.foreign_key.iter().any(|b| *b != 0)
    }

    /// Written by a newer SDK; fields are preserved as read.
    pub fn is_newer_than_supported(&self) -> bool {
        self.version > CURRENT_VERSION
    }

    pub fn encode(&self) -> [u8; MEMO_LEN] {
        let header = MAGIC
            | (u32::from(self.version) & VERSION_MASK) << VERSION_SHIFT
            | (u32::from(self.transfer_type.tag()) & TYPE_MASK) << TYPE_SHIFT
            | (u32::from(self.app_index) & APP_INDEX_MASK) << APP_INDEX_SHIFT;

        let mut out = [0u8; MEMO_LEN];
        out[..HEADER_LEN].copy_from_slice(&header.to_le_bytes());
        out[HEADER_LEN..HEADER_LEN + FOREIGN_KEY_LEN].copy_from_slice(&self.foreign_key);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != MEMO_LEN {
            return Err(DecodeError::InvalidLength {
                expected: MEMO_LEN,
                actual: bytes.len(),
            });
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = u32::from_le_bytes(header);

        let magic = header & MAGIC_MASK;
        if magic != MAGIC {
            return Err(DecodeError::UnknownVersion(magic as u8));
        }

        let mut foreign_key = [0u8; FOREIGN_KEY_LEN];
        foreign_key.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + FOREIGN_KEY_LEN]);

        let tag = ((header >> TYPE_SHIFT) & TYPE_MASK) as u8;
        let memo = Self {
            version: ((header >> VERSION_SHIFT) & VERSION_MASK) as u8,
            transfer_type: TransferType::from_tag(tag).unwrap_or_default(),
            app_index: ((header >> APP_INDEX_SHIFT) & APP_INDEX_MASK) as u16,
            foreign_key,
        };

        if TransferType::from_tag(tag).is_none() {
            return Err(DecodeError::UnknownTransferType { tag, memo });
        }
        Ok(memo)
    }

    /// Base64 text placed in a memo instruction.
    pub fn to_instruction_data(&self) -> Vec<u8> {
        base64::encode(self.encode()).into_bytes()
    }

    pub fn from_instruction_data(data: &[u8]) -> Result<Self, DecodeError> {
        let raw = base64::decode(data).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
        Self::decode(&raw)
    }
}
