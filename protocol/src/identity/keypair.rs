//! Client-side identity keys.
//!
//! The server never holds a private identity key in production. This type
//! exists for the client helper, the node's `sign` tooling and tests: it plays
//! the part of a SQRL app deriving a site key and signing requests with it.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;

use super::{Identity, Signature};
use crate::crypto::encode_b64;

/// An Ed25519 keypair producing SQRL identities and signatures.
///
/// Intentionally not `Serialize`: exporting key material should be a
/// deliberate act via [`secret_key_bytes`](Self::secret_key_bytes).
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Constructs a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The `idk` value a client would send for this key.
    pub fn identity(&self) -> Identity {
        Identity::new(encode_b64(&self.signing_key.verifying_key().to_bytes()))
    }

    /// Signs `payload` and returns the `ids` value a client would send.
    pub fn sign(&self, payload: &str) -> Signature {
        let sig = self.signing_key.sign(payload.as_bytes());
        Signature::new(encode_b64(&sig.to_bytes()))
    }

    /// Exports the raw 32-byte secret key. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for IdentityKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl std::fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeypair")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}
