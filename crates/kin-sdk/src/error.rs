use kin_memo::{BindingError, DecodeError, InvoiceError};
use kin_solana::SolError;
use kin_storage::CacheError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("transaction error: {0}")]
    Transaction(#[from] SolError),

    #[error("memo error: {0}")]
    Memo(#[from] DecodeError),

    #[error("invoice error: {0}")]
    Invoice(#[from] InvoiceError),

    #[error("invoice binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_errors_convert() {
        let err: SdkError = BindingError::CountMismatch {
            transfers: 3,
            invoices: 2,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invoice binding error: 3 transfers cannot bind 2 invoices"
        );
    }

    #[test]
    fn transport_errors_convert() {
        let err: SdkError = TransportError::Unavailable("dns".into()).into();
        assert!(matches!(err, SdkError::Transport(_)));
    }
}
