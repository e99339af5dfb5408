//! # SQRL Service
//!
//! The policy layer between an HTTP front end and the protocol core. Given a
//! parsed `/cli.sqrl` request it looks up the session, runs the verification
//! state machine, checks the nut, persists the transaction, and carries out
//! the client's command. Every outcome, good or bad, is a [`ServerMsg`]: the
//! client always gets a reply it can parse, with the TIF flags telling it
//! what happened.
//!
//! ## Request flow
//!
//! ```text
//! build reply (fresh nut, qry)
//!   → first transaction from Store        (failure: CommandFailed|TransientError)
//!   → verify                              (failure: flags from verify)
//!   → inspect nut                         (malformed / expired / wrong client)
//!   → save transaction                    (nut already used: CommandFailed|ClientFailure)
//!   → look up user                        (known: CurrentIDMatch)
//!   → ident / query / unsupported
//! ```

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{SqrlConfig, PROTOCOL_VERSION, SQRL_SCHEME};
use crate::message::{ClientMsg, Command, Opt, ServerMsg, Tif};
use crate::nut::{Nut, NutError, Nutter};
use crate::store::{Store, StoreError, User};
use crate::token::{AesTokenExchange, Token, TokenError, TokenExchange};
use crate::transaction::{verify_with_policy, Request, Transaction, VerifyError};

/// Wires the nut engine, token exchange and store together under one config.
pub struct SqrlService {
    config: SqrlConfig,
    nutter: Nutter,
    tokens: Arc<dyn TokenExchange>,
    store: Arc<dyn Store>,
}

impl SqrlService {
    pub fn new(config: SqrlConfig, store: Arc<dyn Store>) -> Self {
        let nutter = Nutter::new(&config.nut_key).with_expiry(config.nut_expiry);
        let tokens = AesTokenExchange::new(&config.token_key).with_expiry(config.token_expiry);
        Self {
            config,
            nutter,
            tokens: Arc::new(tokens),
            store,
        }
    }

    /// Replaces the default AES token exchange.
    pub fn with_token_exchange(mut self, tokens: Arc<dyn TokenExchange>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &SqrlConfig {
        &self.config
    }

    pub fn nutter(&self) -> &Nutter {
        &self.nutter
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Issues a nut for a login page, bound to `client_id` when given.
    pub fn issue_nut(&self, client_id: Option<&str>) -> Result<Nut, NutError> {
        let nut = self.nutter.next(client_id)?;
        debug!(nut = %nut, bound = client_id.is_some(), "nut issued");
        Ok(nut)
    }

    /// The `sqrl://` URL a login page presents (as a link or QR code).
    pub fn login_url(&self, domain: &str, nut: &Nut) -> String {
        format!("{SQRL_SCHEME}://{domain}/sqrl?nut={nut}")
    }

    /// A fresh reply with no flags set: a new unbound nut and the `qry`
    /// pointing at it.
    pub fn next_reply(&self) -> Result<ServerMsg, NutError> {
        let nut = self.nutter.next(None)?;
        let qry = format!("{}?nut={}", self.config.client_endpoint, nut);
        Ok(ServerMsg::new(vec![PROTOCOL_VERSION.to_string()], nut, qry))
    }

    /// The reply for a request that never made it to verification, such as an
    /// unparseable form body.
    pub fn client_failure_reply(&self) -> Result<ServerMsg, NutError> {
        let mut reply = self.next_reply()?;
        reply.set(Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
        Ok(reply)
    }

    /// Handles one `/cli.sqrl` request.
    ///
    /// # Errors
    ///
    /// Only if the reply's own nut cannot be sealed. Every protocol failure is
    /// reported through the reply's TIF flags instead.
    pub async fn handle_client(&self, req: Request) -> Result<ServerMsg, NutError> {
        let mut reply = self.next_reply()?;
        self.process(&req, &mut reply).await;
        Ok(reply)
    }

    async fn process(&self, req: &Request, reply: &mut ServerMsg) {
        let first = match self.store.get_first_transaction(&req.nut).await {
            Ok(first) => first,
            Err(err) => return transient(reply, "failed to retrieve first transaction", &err),
        };

        let client = match verify_with_policy(req, first.as_ref(), reply, self.config.ident_policy) {
            Ok(client) => client,
            Err(err) => {
                if err == VerifyError::IpMismatch {
                    reply.set(Tif::COMMAND_FAILED);
                }
                warn!(nut = %req.nut, ip = %req.client_ip, error = %err, "transaction rejected");
                return;
            }
        };

        if !self.check_nut(req, &client, reply) {
            return;
        }

        let transaction = Transaction::new(req.clone(), reply.nut.clone());
        match self.store.save_transaction(&transaction).await {
            Ok(()) => {}
            Err(StoreError::NutReused(nut)) => {
                warn!(nut = %nut, ip = %req.client_ip, "nut replayed");
                reply.set(Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
                return;
            }
            Err(err) => return transient(reply, "failed to save transaction", &err),
        }

        let user = match self.store.get_user_by_identity(&client.idk).await {
            Ok(user) => user,
            Err(err) => return transient(reply, "failed to look up identity", &err),
        };
        if user.is_some() {
            reply.set(Tif::CURRENT_ID_MATCH);
        }

        match client.command {
            Command::Ident => {
                let session = first.as_ref().map_or(&req.nut, Transaction::nut);
                self.ident(&client, user, session, reply).await;
            }
            Command::Query => {
                debug!(idk = %client.idk, known = reply.is(Tif::CURRENT_ID_MATCH), "query");
            }
            _ => {
                debug!(command = %client.command, "unsupported command");
                reply.set(Tif::FUNCTION_NOT_SUPPORTED);
            }
        }
    }

    /// Checks the nut the request was posted with. Returns `false` once the
    /// reply has been flagged as failed.
    fn check_nut(&self, req: &Request, client: &ClientMsg, reply: &mut ServerMsg) -> bool {
        let claims = match self.nutter.inspect(&req.nut) {
            Ok(claims) => claims,
            Err(_) => {
                warn!(nut = %req.nut, "malformed nut");
                reply.set(Tif::COMMAND_FAILED | Tif::CLIENT_FAILURE);
                return false;
            }
        };

        if claims.expired_at(Utc::now().timestamp(), self.nutter.expiry()) {
            warn!(nut = %req.nut, "expired nut");
            reply.set(Tif::COMMAND_FAILED | Tif::TRANSIENT_ERROR);
            return false;
        }

        if claims.is_bound() {
            if claims.binds(Some(&req.client_ip)) {
                reply.set(Tif::IP_MATCH);
            } else if !client.has_opt(&Opt::NoIpTest) {
                warn!(nut = %req.nut, ip = %req.client_ip, "nut issued to a different client");
                reply.set(Tif::COMMAND_FAILED);
                return false;
            }
        }
        true
    }

    async fn ident(&self, client: &ClientMsg, user: Option<User>, session: &Nut, reply: &mut ServerMsg) {
        let user = match user {
            Some(user) => user,
            None => match self.store.create_user(&client.idk).await {
                Ok(user) => user,
                Err(err) => return transient(reply, "failed to create user", &err),
            },
        };

        let token = match self.tokens.token(&user.id) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to issue token");
                reply.set(Tif::COMMAND_FAILED | Tif::TRANSIENT_ERROR);
                return;
            }
        };

        if let Err(err) = self.store.save_ident_success(session, &token).await {
            return transient(reply, "failed to save ident success", &err);
        }
        info!(user = %user.id, session = %session, "ident succeeded");

        if client.has_opt(&Opt::Cps) {
            reply.url = Some(self.redirect_url(&token));
        }
    }

    /// The redirect URL for a session whose `ident` has succeeded, or `None`
    /// while the user has not logged in yet.
    ///
    /// A nut bound to a client only yields the URL to that same client, so a
    /// nut copied off the login page is useless from anywhere else. Expiry is
    /// not checked: the browser keeps polling while the user finishes in the
    /// app.
    pub async fn pending_redirect(&self, nut: &Nut, client_ip: &str) -> Result<Option<String>, StoreError> {
        match self.nutter.inspect(nut) {
            Ok(claims) if claims.binds(Some(client_ip)) => {}
            Ok(_) => {
                warn!(nut = %nut, ip = %client_ip, "redirect polled by a different client");
                return Ok(None);
            }
            Err(_) => {
                debug!(nut = %nut, "redirect polled with a malformed nut");
                return Ok(None);
            }
        }
        let token = self.store.get_ident_success(nut).await?;
        Ok(token.map(|token| self.redirect_url(&token)))
    }

    /// Trades a token for the user id it was issued to.
    pub fn exchange_token(&self, token: &Token) -> Result<String, TokenError> {
        self.tokens.validate(token)
    }

    fn redirect_url(&self, token: &Token) -> String {
        format!("{}?token={}", self.config.redirect_url, token)
    }
}

fn transient(reply: &mut ServerMsg, what: &str, err: &StoreError) {
    warn!(error = %err, "{what}");
    reply.set(Tif::COMMAND_FAILED | Tif::TRANSIENT_ERROR);
}

impl std::fmt::Debug for SqrlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqrlService")
            .field("config", &self.config)
            .field("nutter", &self.nutter)
            .finish_non_exhaustive()
    }
}
