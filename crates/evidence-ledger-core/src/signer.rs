//! The signer seam.
//!
//! A receipt's `signature` is an opaque string produced by an external
//! collaborator. Nothing in this crate verifies it; the hash chain is the
//! integrity anchor. [`Ed25519Signer`] is provided for producers that want a
//! concrete signer.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use std::fmt;

/// Produces the opaque signature attached to a receipt.
pub trait Signer: Send + Sync {
    /// Sign the receipt body (canonical JSON without `hash` and `signature`).
    fn sign(&self, message: &[u8]) -> String;
}

/// Ed25519 signer emitting lowercase hex signatures.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Check a hex signature produced by this key. For auditors holding the
    /// producer's key; the verifier never calls it.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        verify_hex(&self.signing_key.verifying_key(), message, signature_hex)
    }
}

fn verify_hex(key: &VerifyingKey, message: &[u8], signature_hex: &str) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&bytes)).is_ok()
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signer({})", &self.public_key_hex()[..16])
    }
}
