//! Request and transaction records.
//!
//! A login attempt is a chain of transactions. Each one names the nut the
//! server handed back in its reply as `next`, and the client's following
//! request is posted with that nut, so the chain can be walked backwards to
//! the transaction that opened the session.

use serde::{Deserialize, Serialize};

use crate::identity::Signature;
use crate::nut::Nut;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One inbound `/cli.sqrl` request, exactly as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// The `nut` query parameter the request was posted with.
    pub nut: Nut,
    /// Raw base64url `client` form field.
    pub client: String,
    /// Raw base64url `server` form field: either the encoded `sqrl://` URL
    /// (first request only) or the previous reply.
    pub server: String,
    /// `ids`: the identity's signature over `client + server`.
    pub ids: Signature,
    pub client_ip: String,
}

impl Request {
    /// The exact bytes `ids` signs: the raw `client` then the raw `server`.
    pub fn signed_payload(&self) -> String {
        let mut payload = String::with_capacity(self.client.len() + self.server.len());
        payload.push_str(&self.client);
        payload.push_str(&self.server);
        payload
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A request the server accepted, plus the nut it issued in reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(flatten)]
    pub request: Request,
    /// The nut sent back in this transaction's reply.
    pub next: Nut,
}

impl Transaction {
    pub fn new(request: Request, next: Nut) -> Self {
        Self { request, next }
    }

    /// The nut this transaction was posted with.
    pub fn nut(&self) -> &Nut {
        &self.request.nut
    }

    pub fn client_ip(&self) -> &str {
        &self.request.client_ip
    }
}
