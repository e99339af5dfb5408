//! The verification state machine.
//!
//! A single function run once per inbound request. It checks, in order and
//! stopping at the first failure:
//!
//! 1. **client** parses as a [`ClientMsg`].
//! 2. **server** is either the `sqrl://` challenge URL (first transaction
//!    only) or a well-formed [`ServerMsg`], and names a nut.
//! 3. **ids** is the client identity's signature over `client + server`.
//! 4. On follow-up transactions, the request comes from the same IP as the
//!    session's first transaction, unless the client asserted `noiptest`.
//!
//! Failures set flags on the reply being built as a side effect, so the
//! caller can always answer with a well-formed [`ServerMsg`].

use thiserror::Error;
use tracing::debug;
use url::Url;

use super::types::{Request, Transaction};
use crate::config::SQRL_SCHEME;
use crate::crypto::decode_b64;
use crate::message::{ClientMsg, Command, Opt, ServerMsg, Tif};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// The closed set of reasons a request can be rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid client param")]
    InvalidClient,

    #[error("invalid server param")]
    InvalidServer,

    #[error("invalid identity signature")]
    InvalidIdSig,

    #[error("ip does not match")]
    IpMismatch,
}

/// Whether `ident` may open a session without a prior `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentPolicy {
    /// Accept `ident` as the very first transaction.
    #[default]
    AllowDirect,
    /// Reject `ident` unless a `query` already opened the session.
    RequireQueryFirst,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies `req` against the session's first transaction (`None` if this
/// request opens the session) and returns the parsed client message.
///
/// # Errors
///
/// The first failing check as a [`VerifyError`]. Every variant except
/// `IpMismatch` also sets `CommandFailed | ClientFailure` on `response`.
pub fn verify(
    req: &Request,
    first: Option<&Transaction>,
    response: &mut ServerMsg,
) -> Result<ClientMsg, VerifyError> {
    verify_with_policy(req, first, response, IdentPolicy::AllowDirect)
}

/// [`verify`] with an explicit [`IdentPolicy`], checked right after the
/// signature.
pub fn verify_with_policy(
    req: &Request,
    first: Option<&Transaction>,
    response: &mut ServerMsg,
    policy: IdentPolicy,
) -> Result<ClientMsg, VerifyError> {
    let Ok(client) = ClientMsg::decode(&req.client) else {
        return Err(reject(response, VerifyError::InvalidClient));
    };

    if !server_param_ok(&req.server, first.is_none()) {
        return Err(reject(response, VerifyError::InvalidServer));
    }

    if !req.ids.verify(&client.idk, &req.signed_payload()) {
        return Err(reject(response, VerifyError::InvalidIdSig));
    }

    if policy == IdentPolicy::RequireQueryFirst
        && first.is_none()
        && client.command == Command::Ident
    {
        debug!(idk = %client.idk, "ident without prior query rejected");
        return Err(reject(response, VerifyError::InvalidClient));
    }

    let Some(first) = first else {
        return Ok(client);
    };

    if first.client_ip() == req.client_ip {
        response.set(Tif::IP_MATCH);
    }
    if !client.has_opt(&Opt::NoIpTest) && !response.is(Tif::IP_MATCH) {
        debug!(
            expected = first.client_ip(),
            actual = %req.client_ip,
            "request ip differs from session origin"
        );
        return Err(VerifyError::IpMismatch);
    }

    Ok(client)
}

fn reject(response: &mut ServerMsg, err: VerifyError) -> VerifyError {
    response.set(Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
    err
}

/// A bare challenge URL is only a legitimate `server` value when echoed back
/// on the session's first transaction.
fn server_param_ok(raw: &str, is_first: bool) -> bool {
    let Ok(bytes) = decode_b64(raw) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(bytes) else {
        return false;
    };

    if decoded.starts_with(SQRL_SCHEME) {
        return is_first && challenge_url_has_nut(&decoded);
    }

    ServerMsg::decode(raw).is_ok_and(|msg| !msg.nut.is_empty())
}

fn challenge_url_has_nut(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    // Only the first `nut` counts, the same one a nut lookup would read.
    url.query_pairs()
        .find(|(key, _)| key == "nut")
        .is_some_and(|(_, value)| !value.is_empty())
}
