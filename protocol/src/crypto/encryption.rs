//! # AES-256-GCM Sealing
//!
//! Authenticated encryption shared by the nut engine and the token exchange.
//! Both seal a short plaintext under a server key and ship the result to a
//! client as an opaque string, so they share one wire format:
//!
//! ```text
//! base64url-no-pad( nonce (12) || ciphertext || tag (16) )
//! ```
//!
//! ## Nonce management
//!
//! GCM is notoriously unforgiving about nonce reuse: two messages under the
//! same key and nonce leak the XOR of the plaintexts and let an attacker forge
//! tags. Every seal draws a fresh random 96-bit nonce from `OsRng`. The
//! birthday bound for that is ~2^48 seals per key, comfortably beyond the
//! lifetime of a login server key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during sealing/opening.
///
/// We intentionally keep these vague. The difference between "wrong key" and
/// "corrupted ciphertext" is none of a client's business.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("ciphertext too short: must be longer than {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// An AES-256-GCM key ready to seal and open short messages.
///
/// The cipher is keyed once at construction; sealing is then cheap and
/// `&self`, so one `SealingKey` can be shared across request handlers.
#[derive(Clone)]
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl SealingKey {
    pub fn new(key: &[u8; AES_KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Builds a key from a slice of runtime-determined length (config, CLI).
    pub fn from_slice(key: &[u8]) -> Result<Self, EncryptionError> {
        let key: &[u8; AES_KEY_LENGTH] = key
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self::new(key))
    }

    /// Seals `plaintext` and returns `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::EncryptFailed)?;

        let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Opens data produced by [`seal`](Self::seal).
    ///
    /// Input no longer than a nonce is rejected before touching the cipher.
    /// Every other failure is `DecryptFailed`, whatever the cause.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if data.len() <= AES_NONCE_LENGTH {
            return Err(EncryptionError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EncryptionError::DecryptFailed)
    }

    /// Seals and encodes in one step: the form every opaque SQRL value takes.
    pub fn seal_to_string(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        Ok(encode_b64(&self.seal(plaintext)?))
    }

    /// Decodes and opens in one step. Bad base64 is reported as
    /// `DecryptFailed`, indistinguishable from a forged ciphertext.
    pub fn open_str(&self, encoded: &str) -> Result<Vec<u8>, EncryptionError> {
        let data = decode_b64(encoded).map_err(|_| EncryptionError::DecryptFailed)?;
        self.open(&data)
    }
}

// Never print the key schedule.
impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}

/// Base64url without padding, the encoding of every SQRL wire value.
pub fn encode_b64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Inverse of [`encode_b64`].
pub fn decode_b64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded.as_bytes())
}
