//! Signing collaborators.

use kin_solana::{PrivateKey, PublicKey, SolError, Transaction};

pub trait TransactionSigner: Send + Sync {
    fn public_key(&self) -> PublicKey;

    /// Ed25519 signature over `message`.
    fn sign(&self, message: &[u8]) -> Result<[u8; 64], SolError>;
}

/// Signs with a key held in process memory.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key: PrivateKey,
}

impl LocalSigner {
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(PrivateKey::generate())
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl TransactionSigner for LocalSigner {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; 64], SolError> {
        Ok(self.key.sign(message))
    }
}

/// Fill `signer`'s signature slot in `tx`.
pub fn sign_with(tx: &mut Transaction, signer: &dyn TransactionSigner) -> Result<(), SolError> {
    let public_key = signer.public_key();
    let slot = tx
        .message
        .signers()
        .iter()
        .position(|key| *key == public_key)
        .ok_or_else(|| SolError::SigningError(format!("{public_key} not found in transaction signers")))?;
    let message = tx.message.serialize()?;
    let signature = signer.sign(&message)?;
    match tx.signatures.get_mut(slot) {
        Some(entry) => *entry = signature,
        None => {
            return Err(SolError::SigningError(format!(
                "transaction has no signature slot {slot}"
            )))
        }
    }
    Ok(())
}
