//! Locally custodied Ed25519 signing keys.

use std::fmt;

use ed25519_dalek::Signer;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::address::PublicKey;
use crate::error::SolError;

/// A 32-byte Ed25519 seed, wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn from_bytes(seed: [u8; 32]) -> Self {
        Self(seed)
    }

    pub fn from_slice(seed: &[u8]) -> Result<Self, SolError> {
        let arr: [u8; 32] = seed.try_into().map_err(|_| {
            SolError::InvalidPrivateKey(format!("expected 32 bytes, got {}", seed.len()))
        })?;
        Ok(Self(arr))
    }

    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        Self(signing_key.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing_key().verifying_key().to_bytes())
    }

    /// Sign `message`, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key().sign(message).to_bytes()
    }

    pub fn expose_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn signing_key(&self) -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::from_bytes(&self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(public={}, secret=<redacted>)", self.public_key())
    }
}

/// Verify an Ed25519 signature over `message`.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    vk.verify_strict(message, &sig).is_ok()
}
