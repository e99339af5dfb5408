//! # Token Exchange
//!
//! After a successful `ident` the SQRL server holds a user id, but the
//! browser that started the login is a different client entirely. The
//! exchange hands that result over as a short-lived opaque token: the
//! browser is redirected with `?token=...`, and the resource server trades
//! the token for the user id.
//!
//! Tokens are `"{user_id},{unix_seconds}"` sealed with AES-256-GCM in the
//! same nonce-prefixed format as nuts.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, DEFAULT_TOKEN_EXPIRY, TOKEN_DELIMITER};
use crate::crypto::SealingKey;

/// An opaque, base64url-encoded login token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The user id contains the plaintext delimiter and cannot be encoded.
    #[error("user id must not contain '{TOKEN_DELIMITER}'")]
    InvalidUserId,

    #[error("token format invalid")]
    TokenFormatInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("failed to seal token")]
    SealFailed,
}

/// Issues tokens for authenticated users.
pub trait TokenGenerator: Send + Sync {
    fn token(&self, user_id: &str) -> Result<Token, TokenError>;
}

/// Redeems tokens for the user id they were issued to.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &Token) -> Result<String, TokenError>;
}

/// Both halves of the exchange.
pub trait TokenExchange: TokenGenerator + TokenValidator {}

impl<T: TokenGenerator + TokenValidator> TokenExchange for T {}

/// The AES-256-GCM token exchange.
#[derive(Debug, Clone)]
pub struct AesTokenExchange {
    key: SealingKey,
    expiry: Duration,
}

impl AesTokenExchange {
    pub fn new(key: &[u8; AES_KEY_LENGTH]) -> Self {
        Self {
            key: SealingKey::new(key),
            expiry: DEFAULT_TOKEN_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Issues a token for `user_id` stamped with `now` (unix seconds).
    pub fn token_at(&self, user_id: &str, now: i64) -> Result<Token, TokenError> {
        if user_id.contains(TOKEN_DELIMITER) {
            return Err(TokenError::InvalidUserId);
        }
        let payload = format!("{user_id}{TOKEN_DELIMITER}{now}");
        self.key
            .seal_to_string(payload.as_bytes())
            .map(Token)
            .map_err(|_| TokenError::SealFailed)
    }

    /// Validates `token` as of `now` (unix seconds).
    pub fn validate_at(&self, token: &Token, now: i64) -> Result<String, TokenError> {
        let plaintext = self
            .key
            .open_str(token.as_str())
            .map_err(|_| TokenError::TokenFormatInvalid)?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| TokenError::TokenFormatInvalid)?;

        let mut parts = plaintext.split(TOKEN_DELIMITER);
        let (Some(user_id), Some(created_at), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TokenError::TokenFormatInvalid);
        };
        let created_at: i64 = created_at
            .parse()
            .map_err(|_| TokenError::TokenFormatInvalid)?;

        let max_age = i64::try_from(self.expiry.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(created_at) > max_age {
            return Err(TokenError::TokenExpired);
        }
        Ok(user_id.to_string())
    }
}

impl TokenGenerator for AesTokenExchange {
    fn token(&self, user_id: &str) -> Result<Token, TokenError> {
        self.token_at(user_id, Utc::now().timestamp())
    }
}

impl TokenValidator for AesTokenExchange {
    fn validate(&self, token: &Token) -> Result<String, TokenError> {
        self.validate_at(token, Utc::now().timestamp())
    }
}
