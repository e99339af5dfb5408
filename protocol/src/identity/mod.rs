//! # Identity Module
//!
//! A SQRL identity is an Ed25519 public key, unique per (user, site), that the
//! client derives and sends as `idk`. The server never generates one: it only
//! receives them, stores them, and checks signatures against them.
//!
//! Both value types keep the exact base64url string that came off the wire.
//! Decoding happens only at verification time, so a malformed identity or
//! signature simply fails to verify rather than failing to parse.

pub mod keypair;

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};
use crate::crypto::decode_b64;

pub use keypair::IdentityKeypair;

/// A user's site-specific public key, base64url (no padding) encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

/// A base64url (no padding) Ed25519 signature sent by the client, checked
/// against the corresponding [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Identity {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the identity into an Ed25519 verifying key.
    ///
    /// `None` for anything that isn't 32 bytes of base64url describing a
    /// valid curve point.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        let bytes = decode_b64(&self.0).ok()?;
        let bytes: [u8; VERIFYING_KEY_LENGTH] = bytes.try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }
}

impl Signature {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` iff this is a valid signature by `id` over `payload`.
    ///
    /// Undecodable keys, wrong-length signatures and bad signatures are all
    /// just `false`. Callers get no oracle telling them which part was wrong.
    pub fn verify(&self, id: &Identity, payload: &str) -> bool {
        let Some(key) = id.verifying_key() else {
            return false;
        };
        let Ok(bytes) = decode_b64(&self.0) else {
            return false;
        };
        let Ok(bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(bytes) else {
            return false;
        };
        let signature = DalekSignature::from_bytes(&bytes);
        key.verify(payload.as_bytes(), &signature).is_ok()
    }
}

/// Free-function form of [`Signature::verify`].
pub fn verify(id: &Identity, payload: &str, signature: &Signature) -> bool {
    signature.verify(id, payload)
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Signature {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Signature {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encode_b64;

    #[test]
    fn test_valid_signature_verifies() {
        let kp = IdentityKeypair::generate();
        let sig = kp.sign("client-payload|server-payload");
        assert!(sig.verify(&kp.identity(), "client-payload|server-payload"));
        assert!(verify(&kp.identity(), "client-payload|server-payload", &sig));
    }

    #[test]
    fn test_flipped_payload_byte_fails() {
        let kp = IdentityKeypair::generate();
        let sig = kp.sign("abcdef");
        assert!(!sig.verify(&kp.identity(), "abcdeg"));
    }

    #[test]
    fn test_flipped_signature_byte_fails() {
        let kp = IdentityKeypair::generate();
        let sig = kp.sign("abcdef");
        let mut raw = decode_b64(sig.as_str()).unwrap();
        raw[10] ^= 0x01;
        let tampered = Signature::new(encode_b64(&raw));
        assert!(!tampered.verify(&kp.identity(), "abcdef"));
    }

    #[test]
    fn test_wrong_identity_fails() {
        let alice = IdentityKeypair::generate();
        let bob = IdentityKeypair::generate();
        let sig = alice.sign("hello");
        assert!(!sig.verify(&bob.identity(), "hello"));
    }

    #[test]
    fn test_garbage_inputs_never_verify() {
        let kp = IdentityKeypair::generate();
        let sig = kp.sign("hello");

        assert!(!Signature::new("invalid-sig").verify(&kp.identity(), "hello"));
        assert!(!Signature::new("").verify(&kp.identity(), "hello"));
        assert!(!sig.verify(&Identity::new("not-a-key"), "hello"));
        assert!(!sig.verify(&Identity::default(), "hello"));
    }

    #[test]
    fn test_known_identity_decodes() {
        let id = Identity::new("Vl4KVVRoG0C8v1VP0UEUNK2z_SYhNVYBXdoarhMljzQ");
        assert_eq!(decode_b64(id.as_str()).unwrap().len(), VERIFYING_KEY_LENGTH);
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = Identity::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
