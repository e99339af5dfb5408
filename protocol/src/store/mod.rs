//! # Store
//!
//! Persistence the protocol core depends on but never performs itself:
//! the transaction chain of each login attempt, ident results waiting to be
//! picked up by the browser, and the user table.
//!
//! ```text
//! mod.rs     Store trait, User, StoreError
//! memory.rs  MemoryStore, a single-process implementation
//! ```

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Identity;
use crate::nut::Nut;
use crate::token::Token;
use crate::transaction::Transaction;

pub use memory::MemoryStore;

/// A user known to this site, keyed by their SQRL identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub idk: Identity,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Walking a chain back to its first transaction revisited a nut.
    #[error("transaction chain loops back through nut {0}")]
    ChainCycle(Nut),

    /// A transaction was already saved under this nut.
    #[error("nut {0} has already been used")]
    NutReused(Nut),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction that opened the chain `nut` belongs to, or `None` if
    /// no stored transaction issued `nut` (the request opens a new session).
    async fn get_first_transaction(&self, nut: &Nut) -> Result<Option<Transaction>, StoreError>;

    /// Records a verified transaction.
    ///
    /// Fails with [`StoreError::NutReused`] if a transaction was already saved
    /// under the same nut: each nut answers exactly one request.
    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Records the token issued for a successful `ident`, keyed by the nut of
    /// the session's first transaction.
    async fn save_ident_success(&self, nut: &Nut, token: &Token) -> Result<(), StoreError>;

    /// The token saved by [`save_ident_success`](Self::save_ident_success),
    /// if `ident` has succeeded for that session.
    async fn get_ident_success(&self, nut: &Nut) -> Result<Option<Token>, StoreError>;

    async fn get_user_by_identity(&self, idk: &Identity) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, idk: &Identity) -> Result<User, StoreError>;
}
