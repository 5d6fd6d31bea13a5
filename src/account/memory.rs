use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{Account, AccountManager};
use crate::error::AccountError;

/// Account store kept entirely in memory.
pub struct InMemoryAccountManager {
    accounts: RwLock<HashMap<String, Account>>,
    closed: AtomicBool,
}

impl InMemoryAccountManager {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    fn ensure_open(&self) -> Result<(), AccountError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AccountError::Closed);
        }
        Ok(())
    }
}

impl Default for InMemoryAccountManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountManager for InMemoryAccountManager {
    async fn get_account(&self, id: &str) -> Result<Account, AccountError> {
        self.ensure_open()?;
        self.accounts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AccountError::NotFound(id.to_string()))
    }

    async fn create_account(
        &self,
        id: &str,
        password: &str,
        balance: i64,
    ) -> Result<Account, AccountError> {
        self.ensure_open()?;
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(id) {
            return Err(AccountError::AlreadyExists(id.to_string()));
        }

        let account = Account::new(id, password, balance);
        accounts.insert(id.to_string(), account.clone());
        tracing::info!("Created account '{}' with balance {}", id, balance);
        Ok(account)
    }

    async fn delete_account(&self, id: &str) -> Result<(), AccountError> {
        self.ensure_open()?;
        self.accounts
            .write()
            .await
            .remove(id)
            .map(|_| tracing::info!("Deleted account '{}'", id))
            .ok_or_else(|| AccountError::NotFound(id.to_string()))
    }

    async fn update_account(&self, account: &Account) -> Result<(), AccountError> {
        self.ensure_open()?;
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get_mut(account.id())
            .ok_or_else(|| AccountError::NotFound(account.id().to_string()))?;
        *stored = account.clone();
        Ok(())
    }

    async fn validate_login(&self, id: &str, password: &str) -> Result<bool, AccountError> {
        self.ensure_open()?;
        Ok(self
            .accounts
            .read()
            .await
            .get(id)
            .map(|account| account.verify_password(password))
            .unwrap_or(false))
    }

    async fn close(&self) -> Result<(), AccountError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AccountError::Closed);
        }
        tracing::info!("Account manager closed");
        Ok(())
    }
}
