// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SQRL Protocol: Server Core
//!
//! SQRL (Secure Quick Reliable Login) replaces usernames and passwords with a
//! per-site Ed25519 key held by the user's SQRL app. The server issues an
//! encrypted challenge (a *nut*), the client signs it along with a small
//! key/value message, and the server checks the signature, the nut and the
//! session the request belongs to.
//!
//! ## Architecture
//!
//! - **message**: the `client`/`server` wire codec and the TIF flag set.
//! - **nut**: issuing and validating encrypted, client-bound nuts.
//! - **transaction**: the verification state machine every request passes.
//! - **token**: the short-lived token handing a login over to the browser.
//! - **store**: persistence contract for sessions and users, plus an
//!   in-memory implementation.
//! - **service**: the request-handling policy wiring all of the above.
//! - **identity**: identity keys and signatures.
//! - **client**: a minimal client, for tests and tooling.
//! - **crypto**: AES-256-GCM sealing and BLAKE3 binding tags.
//! - **config**: protocol constants and server configuration.
//!
//! ## Ground rules
//!
//! 1. Adversarial input never panics. Every failure is a typed error or a
//!    TIF flag on the reply.
//! 2. Decryption failures are never broken down further than "malformed".
//! 3. The core does no I/O of its own; the store is a trait.

pub mod client;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod message;
pub mod nut;
pub mod service;
pub mod store;
pub mod token;
pub mod transaction;

pub use config::SqrlConfig;
pub use message::{ClientMsg, Command, Opt, ServerMsg, Tif};
pub use nut::{Nut, Nutter};
pub use service::SqrlService;
