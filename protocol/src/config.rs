//! # Protocol Configuration & Constants
//!
//! Every magic number in the SQRL core lives here, along with [`SqrlConfig`],
//! the runtime configuration consumed by [`crate::service::SqrlService`].
//!
//! Wire-level constants (scheme, version, field delimiters) are dictated by the
//! SQRL protocol. Changing them breaks every client in the wild, so don't.

use std::time::Duration;

use crate::transaction::IdentPolicy;

// ---------------------------------------------------------------------------
// Protocol Identifiers
// ---------------------------------------------------------------------------

/// URI scheme of a SQRL challenge URL (`sqrl://example.com/sqrl?nut=...`).
pub const SQRL_SCHEME: &str = "sqrl";

/// The only protocol version this server speaks. Sent as `ver=1`.
pub const PROTOCOL_VERSION: &str = "1";

/// User-Agent value announced by version 1 clients.
pub const USER_AGENT_V1: &str = "SQRL/1";

/// Content type of both the client POST body and the server reply.
///
/// The reply is not really `key=value` form data (it is a single base64 blob),
/// but that is what deployed clients expect to see.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Path clients POST transactions to, relative to the SQRL domain.
pub const DEFAULT_CLIENT_ENDPOINT: &str = "/cli.sqrl";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. 96 bits, the standard GCM nonce.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Ed25519 public key length (the decoded `idk`).
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length (the decoded `ids`).
pub const SIGNATURE_LENGTH: usize = 64;

/// Size of the plaintext block sealed inside every nut:
/// client tag (4) | issued-at (4) | counter (4) | noise (4).
pub const NUT_PLAINTEXT_LENGTH: usize = 16;

/// Length of the client binding tag at the front of a nut's plaintext.
pub const CLIENT_TAG_LENGTH: usize = 4;

/// Separator between the user id and timestamp in a token's plaintext.
pub const TOKEN_DELIMITER: char = ',';

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// How long an issued nut may be redeemed for.
pub const DEFAULT_NUT_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// How long an ident token may sit before the resource server exchanges it.
/// Kept short: the token only has to survive one browser redirect.
pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Runtime configuration for a SQRL server.
///
/// The nut and token keys may be identical; they are kept separate so a
/// deployment can rotate one without invalidating the other.
#[derive(Clone)]
pub struct SqrlConfig {
    /// AES-256-GCM key sealing nuts.
    pub nut_key: [u8; AES_KEY_LENGTH],
    /// AES-256-GCM key sealing ident tokens.
    pub token_key: [u8; AES_KEY_LENGTH],
    /// Maximum age of a nut at redemption.
    pub nut_expiry: Duration,
    /// Maximum age of a token at exchange.
    pub token_expiry: Duration,
    /// Where a CPS-capable client sends the browser after `ident`.
    pub redirect_url: String,
    /// Path the `qry=` field points clients at.
    pub client_endpoint: String,
    /// Whether `ident` may open a session without a prior `query`.
    pub ident_policy: IdentPolicy,
}

impl SqrlConfig {
    /// Config with one key for both nuts and tokens and default expiries.
    pub fn new(key: [u8; AES_KEY_LENGTH], redirect_url: impl Into<String>) -> Self {
        Self {
            nut_key: key,
            token_key: key,
            nut_expiry: DEFAULT_NUT_EXPIRY,
            token_expiry: DEFAULT_TOKEN_EXPIRY,
            redirect_url: redirect_url.into(),
            client_endpoint: DEFAULT_CLIENT_ENDPOINT.to_string(),
            ident_policy: IdentPolicy::default(),
        }
    }

    pub fn with_token_key(mut self, key: [u8; AES_KEY_LENGTH]) -> Self {
        self.token_key = key;
        self
    }

    pub fn with_nut_expiry(mut self, expiry: Duration) -> Self {
        self.nut_expiry = expiry;
        self
    }

    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Sets the endpoint clients post transactions to, relative to the SQRL
    /// domain, e.g. `/sqrl/cli.sqrl`.
    pub fn with_client_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client_endpoint = endpoint.into();
        self
    }

    pub fn with_ident_policy(mut self, policy: IdentPolicy) -> Self {
        self.ident_policy = policy;
        self
    }
}

// Hand-written so key material never reaches a log line.
impl std::fmt::Debug for SqrlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqrlConfig")
            .field("nut_key", &"<redacted>")
            .field("token_key", &"<redacted>")
            .field("nut_expiry", &self.nut_expiry)
            .field("token_expiry", &self.token_expiry)
            .field("redirect_url", &self.redirect_url)
            .field("client_endpoint", &self.client_endpoint)
            .field("ident_policy", &self.ident_policy)
            .finish()
    }
}
