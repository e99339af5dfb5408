//! # Nut Engine
//!
//! A nut is the server's challenge: an encrypted, single-use nonce the client
//! signs and sends back. The sealed plaintext is 16 bytes:
//!
//! ```text
//! [0..4)   client binding tag (all zero = unbound)
//! [4..8)   issued-at, unix seconds, big-endian
//! [8..12)  per-process counter, big-endian
//! [12..16) random noise
//! ```
//!
//! The counter makes every nut from one process unique; the noise keeps nuts
//! from different processes (or restarts) from colliding. Sealing uses a fresh
//! random AES-GCM nonce each time, so even identical plaintexts would produce
//! distinct nuts.
//!
//! Validation always decrypts before looking at the binding. A caller who
//! claims "no client identifier" cannot skip the binding check on a nut that
//! was issued bound, because the decision is taken on the decrypted tag.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, CLIENT_TAG_LENGTH, DEFAULT_NUT_EXPIRY, NUT_PLAINTEXT_LENGTH};
use crate::crypto::{client_tag, SealingKey, UNBOUND_TAG};

/// An opaque, base64url-encoded nut as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nut(String);

impl Nut {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Nut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nut {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Nut {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Why a nut was rejected (or could not be produced).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NutError {
    /// Not base64, too short, forged, sealed under another key, or the wrong
    /// length once opened. Deliberately not broken down any further.
    #[error("malformed nut")]
    MalformedNut,

    #[error("nut was issued to a different client")]
    ClientMismatch,

    #[error("nut has expired")]
    Expired,

    #[error("failed to seal nut")]
    SealFailed,
}

/// The decrypted contents of a nut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NutClaims {
    pub tag: [u8; CLIENT_TAG_LENGTH],
    pub issued_at: u32,
    pub counter: u32,
}

impl NutClaims {
    /// Whether the nut was issued bound to a client identifier.
    pub fn is_bound(&self) -> bool {
        self.tag != UNBOUND_TAG
    }

    /// Whether `client_id` may redeem this nut. Unbound nuts accept anyone;
    /// bound nuts only the identifier they were issued to.
    pub fn binds(&self, client_id: Option<&str>) -> bool {
        !self.is_bound() || self.tag == client_tag(client_id)
    }

    /// `now - issued_at > expiry`, with `now` in unix seconds.
    pub fn expired_at(&self, now: i64, expiry: Duration) -> bool {
        let age = now.saturating_sub(i64::from(self.issued_at));
        age > i64::try_from(expiry.as_secs()).unwrap_or(i64::MAX)
    }

    fn from_plaintext(plaintext: &[u8]) -> Result<Self, NutError> {
        let block: &[u8; NUT_PLAINTEXT_LENGTH] =
            plaintext.try_into().map_err(|_| NutError::MalformedNut)?;

        let mut tag = [0u8; CLIENT_TAG_LENGTH];
        tag.copy_from_slice(&block[0..4]);
        let mut issued_at = [0u8; 4];
        issued_at.copy_from_slice(&block[4..8]);
        let mut counter = [0u8; 4];
        counter.copy_from_slice(&block[8..12]);

        Ok(Self {
            tag,
            issued_at: u32::from_be_bytes(issued_at),
            counter: u32::from_be_bytes(counter),
        })
    }
}

/// Issues and validates nuts under one server key.
///
/// Safe to share between request handlers: the only mutable state is the
/// atomic counter.
pub struct Nutter {
    key: SealingKey,
    expiry: Duration,
    counter: AtomicU32,
}

impl Nutter {
    /// A nutter with the default 5 minute expiry.
    pub fn new(key: &[u8; AES_KEY_LENGTH]) -> Self {
        Self {
            key: SealingKey::new(key),
            expiry: DEFAULT_NUT_EXPIRY,
            counter: AtomicU32::new(0),
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Issues a fresh nut, bound to `client_id` if one is given.
    pub fn next(&self, client_id: Option<&str>) -> Result<Nut, NutError> {
        self.next_at(client_id, Utc::now().timestamp())
    }

    /// [`next`](Self::next) with an explicit issue time.
    pub fn next_at(&self, client_id: Option<&str>, now: i64) -> Result<Nut, NutError> {
        let issued_at = u32::try_from(now.max(0)).unwrap_or(u32::MAX);
        let count = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);

        let mut block = [0u8; NUT_PLAINTEXT_LENGTH];
        block[0..4].copy_from_slice(&client_tag(client_id));
        block[4..8].copy_from_slice(&issued_at.to_be_bytes());
        block[8..12].copy_from_slice(&count.to_be_bytes());
        OsRng.fill_bytes(&mut block[12..16]);

        let sealed = self
            .key
            .seal_to_string(&block)
            .map_err(|_| NutError::SealFailed)?;
        Ok(Nut(sealed))
    }

    /// Decrypts a nut without judging it.
    pub fn inspect(&self, nut: &Nut) -> Result<NutClaims, NutError> {
        let plaintext = self
            .key
            .open_str(nut.as_str())
            .map_err(|_| NutError::MalformedNut)?;
        NutClaims::from_plaintext(&plaintext)
    }

    /// Validates a nut presented by `client_id` against the configured expiry.
    pub fn validate(&self, nut: &Nut, client_id: Option<&str>) -> Result<NutClaims, NutError> {
        self.validate_at(nut, client_id, self.expiry, Utc::now().timestamp())
    }

    /// Decrypt, then check the binding, then check the age.
    pub fn validate_at(
        &self,
        nut: &Nut,
        client_id: Option<&str>,
        expiry: Duration,
        now: i64,
    ) -> Result<NutClaims, NutError> {
        let claims = self.inspect(nut)?;
        if !claims.binds(client_id) {
            return Err(NutError::ClientMismatch);
        }
        if claims.expired_at(now, expiry) {
            return Err(NutError::Expired);
        }
        Ok(claims)
    }

    pub fn is_valid(&self, nut: &Nut, client_id: Option<&str>) -> bool {
        self.validate(nut, client_id).is_ok()
    }
}

impl fmt::Debug for Nutter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nutter")
            .field("expiry", &self.expiry)
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
