//! In-memory [`Store`].
//!
//! Everything sits behind one `parking_lot::Mutex`. No lock is held across an
//! `.await`: each method takes the lock, does its map work and returns.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreError, User};
use crate::identity::Identity;
use crate::nut::Nut;
use crate::token::Token;
use crate::transaction::Transaction;

#[derive(Debug, Default)]
struct Inner {
    /// Nut a transaction was posted with -> that transaction.
    transactions: HashMap<Nut, Transaction>,
    /// Nut issued in a reply -> nut of the transaction that issued it.
    issued_by: HashMap<Nut, Nut>,
    /// First transaction nut -> token from a successful ident.
    ident_tokens: HashMap<Nut, Token>,
    users: Vec<User>,
}

impl Inner {
    fn first_transaction(&self, nut: &Nut) -> Result<Option<Transaction>, StoreError> {
        let Some(mut current) = self.issued_by.get(nut) else {
            return Ok(None);
        };

        let mut visited = HashSet::from([nut]);
        while let Some(previous) = self.issued_by.get(current) {
            if !visited.insert(current) {
                return Err(StoreError::ChainCycle(current.clone()));
            }
            current = previous;
        }

        self.transactions
            .get(current)
            .cloned()
            .map(Some)
            .ok_or_else(|| StoreError::Backend(format!("no transaction stored for nut {current}")))
    }
}

/// A [`Store`] that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().users.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_first_transaction(&self, nut: &Nut) -> Result<Option<Transaction>, StoreError> {
        self.inner.lock().first_transaction(nut)
    }

    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.transactions.contains_key(transaction.nut()) {
            return Err(StoreError::NutReused(transaction.nut().clone()));
        }
        inner
            .transactions
            .insert(transaction.nut().clone(), transaction.clone());
        inner
            .issued_by
            .insert(transaction.next.clone(), transaction.nut().clone());
        debug!(nut = %transaction.nut(), next = %transaction.next, "transaction saved");
        Ok(())
    }

    async fn save_ident_success(&self, nut: &Nut, token: &Token) -> Result<(), StoreError> {
        self.inner
            .lock()
            .ident_tokens
            .insert(nut.clone(), token.clone());
        Ok(())
    }

    async fn get_ident_success(&self, nut: &Nut) -> Result<Option<Token>, StoreError> {
        Ok(self.inner.lock().ident_tokens.get(nut).cloned())
    }

    async fn get_user_by_identity(&self, idk: &Identity) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .lock()
            .users
            .iter()
            .find(|user| &user.idk == idk)
            .cloned())
    }

    async fn create_user(&self, idk: &Identity) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            idk: idk.clone(),
        };
        self.inner.lock().users.push(user.clone());
        debug!(user = %user.id, "user created");
        Ok(user)
    }
}
