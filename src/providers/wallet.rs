use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::contract::parse_amount;
use crate::core::ledger::LedgerClient;
use crate::core::wallet::{AccountProvider, AllowanceProvider};

/// Account taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAccount {
    account: Option<String>,
}

impl StaticAccount {
    pub fn new(account: Option<String>) -> Self {
        Self {
            account: account.filter(|a| !a.trim().is_empty()),
        }
    }
}

impl AccountProvider for StaticAccount {
    fn active_account(&self) -> Option<String> {
        self.account.clone()
    }
}

/// Reads balance and allowance from the payment token contract.
pub struct TokenAllowanceProvider {
    ledger: Arc<dyn LedgerClient>,
    token: String,
}

impl TokenAllowanceProvider {
    pub fn new(ledger: Arc<dyn LedgerClient>, token: &str) -> Self {
        Self {
            ledger,
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl AllowanceProvider for TokenAllowanceProvider {
    async fn balance_of(&self, owner: &str) -> Result<u128> {
        let value = self
            .ledger
            .call(&self.token, "balanceOf", &[json!(owner)])
            .await
            .context("balanceOf failed")?;
        parse_amount(&value)
    }

    async fn allowance(&self, owner: &str, spender: &str) -> Result<u128> {
        let value = self
            .ledger
            .call(&self.token, "allowance", &[json!(owner), json!(spender)])
            .await
            .context("allowance failed")?;
        parse_amount(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::jsonrpc::JsonRpcLedgerClient;
    use crate::providers::util::RetryPolicy;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_static_account_ignores_blank() {
        assert!(StaticAccount::new(Some("  ".to_string())).active_account().is_none());
        assert_eq!(
            StaticAccount::new(Some("0xpayor".to_string())).active_account(),
            Some("0xpayor".to_string())
        );
        assert!(StaticAccount::default().active_account().is_none());
    }

    #[tokio::test]
    async fn test_token_allowance_queries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "params": ["0xdai", "balanceOf", ["0xpayor"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"jsonrpc": "2.0", "id": 1, "result": "500"}),
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "params": ["0xdai", "allowance", ["0xpayor", "0xagreements"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"jsonrpc": "2.0", "id": 2, "result": "0x64"}),
            ))
            .mount(&mock_server)
            .await;

        let ledger = Arc::new(
            JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap(),
        );
        let provider = TokenAllowanceProvider::new(ledger, "0xdai");
        assert_eq!(provider.balance_of("0xpayor").await.unwrap(), 500);
        assert_eq!(
            provider.allowance("0xpayor", "0xagreements").await.unwrap(),
            100
        );
    }
}
