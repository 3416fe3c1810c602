//! Wallet identity and token allowance abstractions

use anyhow::Result;
use async_trait::async_trait;

pub trait AccountProvider: Send + Sync {
    /// Active account used as the default sender for queries and
    /// transactions.
    fn active_account(&self) -> Option<String>;
}

#[async_trait]
pub trait AllowanceProvider: Send + Sync {
    async fn balance_of(&self, owner: &str) -> Result<u128>;
    async fn allowance(&self, owner: &str, spender: &str) -> Result<u128>;
}
