//! # Client Session
//!
//! The client half of the exchange, enough to drive a server end to end:
//! build the `client` parameter, pick the right `server` value, sign both.
//!
//! The first request of a session echoes the base64url-encoded `sqrl://`
//! login URL as `server`. Every later request echoes the previous reply's raw
//! body, byte for byte, since that is what the signature must cover.

use thiserror::Error;
use url::Url;

use crate::config::{PROTOCOL_VERSION, SQRL_SCHEME};
use crate::crypto::encode_b64;
use crate::identity::{Identity, IdentityKeypair, Signature};
use crate::message::{ClientMsg, CodecError, Command, Opt, ServerMsg};
use crate::nut::Nut;
use crate::transaction::Request;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("not a sqrl:// login url")]
    InvalidUri,

    #[error("login url has no nut")]
    MissingNut,

    #[error("invalid server reply: {0}")]
    Codec(#[from] CodecError),
}

/// The three signed form fields plus the nut to post them with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub nut: Nut,
    pub client: String,
    pub server: String,
    pub ids: Signature,
}

impl SignedRequest {
    /// `client=..&server=..&ids=..`. Base64url needs no form escaping.
    pub fn form_body(&self) -> String {
        format!("client={}&server={}&ids={}", self.client, self.server, self.ids)
    }

    /// The request as the server sees it arriving from `client_ip`.
    pub fn into_request(self, client_ip: impl Into<String>) -> Request {
        Request {
            nut: self.nut,
            client: self.client,
            server: self.server,
            ids: self.ids,
            client_ip: client_ip.into(),
        }
    }
}

/// One identity talking to one site.
#[derive(Debug, Clone)]
pub struct ClientSession {
    keypair: IdentityKeypair,
    options: Vec<Opt>,
}

impl ClientSession {
    pub fn new(keypair: IdentityKeypair) -> Self {
        Self {
            keypair,
            options: Vec::new(),
        }
    }

    /// Asserts `opt` on every request of the session.
    pub fn with_opt(mut self, opt: Opt) -> Self {
        if !self.options.contains(&opt) {
            self.options.push(opt);
        }
        self
    }

    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    /// Signs the request that opens a session from a `sqrl://` login URL.
    pub fn first_request(&self, command: Command, login_url: &str) -> Result<SignedRequest, ClientError> {
        let url = Url::parse(login_url).map_err(|_| ClientError::InvalidUri)?;
        if url.scheme() != SQRL_SCHEME {
            return Err(ClientError::InvalidUri);
        }
        let nut = url
            .query_pairs()
            .find(|(key, _)| key == "nut")
            .map(|(_, value)| value.into_owned())
            .filter(|nut| !nut.is_empty())
            .ok_or(ClientError::MissingNut)?;

        self.sign(command, Nut::from(nut), encode_b64(login_url.as_bytes()))
    }

    /// Signs a follow-up request answering the server's raw reply body.
    pub fn follow_up(&self, command: Command, reply: &str) -> Result<SignedRequest, ClientError> {
        let msg = ServerMsg::decode(reply)?;
        self.sign(command, msg.nut, reply.to_string())
    }

    fn sign(&self, command: Command, nut: Nut, server: String) -> Result<SignedRequest, ClientError> {
        let mut msg = ClientMsg::new(vec![PROTOCOL_VERSION.to_string()], command, self.identity());
        for opt in &self.options {
            msg.insert_opt(opt.clone());
        }
        let client = msg.encode()?;
        let ids = self.keypair.sign(&format!("{client}{server}"));
        Ok(SignedRequest { nut, client, server, ids })
    }
}
