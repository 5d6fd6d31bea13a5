pub mod memory;

pub use memory::InMemoryAccountManager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AccountError;
use crate::order::{MarketOrder, Price, QueuedOrder};

/// A brokerage account. Balances are whole cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: String,
    password_hash: Vec<u8>,
    balance: i64,
}

impl Account {
    pub fn new(id: &str, password: &str, balance: i64) -> Self {
        Self {
            id: id.to_string(),
            password_hash: hash_password(password),
            balance,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password_hash == hash_password(password)
    }

    /// Applies an executed trade: buys debit the account, sells credit it.
    /// The balance is left untouched if the result does not fit in an `i64`.
    pub fn reflect_order(
        &mut self,
        order: &MarketOrder,
        execution_price: Price,
    ) -> Result<(), AccountError> {
        let amount = i64::from(order.details().quantity()).checked_mul(execution_price);
        let balance = amount.and_then(|amount| {
            if order.is_buy() {
                self.balance.checked_sub(amount)
            } else {
                self.balance.checked_add(amount)
            }
        });

        self.balance = balance.ok_or_else(|| AccountError::BalanceOverflow(self.id.clone()))?;
        Ok(())
    }
}

fn hash_password(password: &str) -> Vec<u8> {
    Sha256::digest(password.as_bytes()).to_vec()
}

/// Account store used by the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountManager: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Account, AccountError>;

    async fn create_account(
        &self,
        id: &str,
        password: &str,
        balance: i64,
    ) -> Result<Account, AccountError>;

    async fn delete_account(&self, id: &str) -> Result<(), AccountError>;

    /// Persists the account's current state.
    async fn update_account(&self, account: &Account) -> Result<(), AccountError>;

    async fn validate_login(&self, id: &str, password: &str) -> Result<bool, AccountError>;

    async fn close(&self) -> Result<(), AccountError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{MarketBuyOrder, MarketSellOrder};

    #[test]
    fn passwords_are_stored_as_digests() {
        let account = Account::new("neo", "redpill", 0);
        assert_ne!(account.password_hash, b"redpill".to_vec());
        assert_eq!(account.password_hash.len(), 32);
        assert!(account.verify_password("redpill"));
        assert!(!account.verify_password("bluepill"));
    }

    #[test]
    fn buys_debit_and_sells_credit() {
        let mut account = Account::new("neo", "pw", 100_000);

        account
            .reflect_order(&MarketBuyOrder::new("neo", "ABC", 10, 0).into(), 1_250)
            .unwrap();
        assert_eq!(account.balance(), 87_500);

        account
            .reflect_order(&MarketSellOrder::new("neo", "ABC", 4, 0).into(), 1_500)
            .unwrap();
        assert_eq!(account.balance(), 93_500);
    }

    #[test]
    fn overflowing_trades_leave_the_balance_alone() {
        let mut account = Account::new("neo", "pw", 1_000);

        let huge_buy: MarketOrder = MarketBuyOrder::new("neo", "ABC", u32::MAX, 0).into();
        let err = account.reflect_order(&huge_buy, i64::MAX / 2).unwrap_err();
        assert!(matches!(err, AccountError::BalanceOverflow(ref id) if id == "neo"));
        assert_eq!(account.balance(), 1_000);

        let mut rich = Account::new("trinity", "pw", i64::MAX - 10);
        let sell: MarketOrder = MarketSellOrder::new("trinity", "ABC", 1, 0).into();
        assert!(rich.reflect_order(&sell, 11).is_err());
        assert_eq!(rich.balance(), i64::MAX - 10);
        rich.reflect_order(&sell, 10).unwrap();
        assert_eq!(rich.balance(), i64::MAX);
    }
}
