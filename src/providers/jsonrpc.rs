use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

use super::util::{RetryPolicy, with_retry};
use crate::core::ledger::{BlockRange, EventRecord, LedgerClient, TransactionReceipt};

/// Ledger client speaking JSON-RPC 2.0 over HTTP to a ledger gateway.
///
/// Transport errors are retried per the configured [`RetryPolicy`]; JSON-RPC
/// error objects (including contract reverts) are returned as-is.
pub struct JsonRpcLedgerClient {
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
    pub fn new(url: &str, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("accrue/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(JsonRpcLedgerClient {
            url: url.to_string(),
            client,
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(id, method, url = %self.url, "Sending ledger request");

        let response = with_retry(|| self.client.post(&self.url).json(&body).send(), self.retry)
            .await
            .map_err(|e| anyhow!("Request error: {} for method: {}", e, method))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for method: {}",
                response.status(),
                method
            ));
        }

        let text = response.text().await?;
        let envelope: RpcResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON-RPC response for {}: {}", method, e))?;

        if let Some(err) = envelope.error {
            return Err(anyhow!(
                "Ledger error {} for method {}: {}",
                err.code,
                method,
                err.message
            ));
        }

        let result = envelope
            .result
            .ok_or_else(|| anyhow!("Missing result for method: {}", method))?;
        serde_json::from_value(result)
            .with_context(|| format!("Unexpected result shape for method: {method}"))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    #[instrument(name = "LedgerEvents", skip(self, range), fields(event = %event))]
    async fn get_past_events(
        &self,
        contract: &str,
        event: &str,
        range: &BlockRange,
    ) -> Result<Vec<EventRecord>> {
        self.request("ledger_getPastEvents", json!([contract, event, range]))
            .await
    }

    #[instrument(name = "LedgerCall", skip(self, args), fields(method = %method))]
    async fn call(&self, contract: &str, method: &str, args: &[Value]) -> Result<Value> {
        self.request("ledger_call", json!([contract, method, args]))
            .await
    }

    #[instrument(name = "LedgerSend", skip(self, args), fields(method = %method, from = %from))]
    async fn send(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
        from: &str,
    ) -> Result<TransactionReceipt> {
        self.request(
            "ledger_send",
            json!([contract, method, args, { "from": from }]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_rpc(rpc_method: &str, response: Value) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_successful_call() {
        let mock_server = mock_rpc(
            "ledger_call",
            json!({"jsonrpc": "2.0", "id": 1, "result": "35585162410681240"}),
        )
        .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let result = client
            .call("0xcontract", "getAmountOwed", &[json!("1")])
            .await
            .unwrap();
        assert_eq!(result, json!("35585162410681240"));
    }

    #[tokio::test]
    async fn test_call_sends_contract_method_and_args() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "ledger_call",
                "params": ["0xcontract", "getInterestOwed", ["1000"]]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "12"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let result = client
            .call("0xcontract", "getInterestOwed", &[json!("1000")])
            .await
            .unwrap();
        assert_eq!(result, json!("12"));
    }

    #[tokio::test]
    async fn test_past_events() {
        let mock_server = mock_rpc(
            "ledger_getPastEvents",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [{
                    "event": "AddAgreement",
                    "blockNumber": 12,
                    "returnValues": {"agreementId": "1", "annualAmount": "100"}
                }]
            }),
        )
        .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let events = client
            .get_past_events("0xcontract", "AddAgreement", &BlockRange::since(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, Some(12));
        assert_eq!(events[0].return_values["annualAmount"], json!("100"));
    }

    #[tokio::test]
    async fn test_send_returns_receipt() {
        let mock_server = mock_rpc(
            "ledger_send",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"transactionHash": "0xfeed", "blockNumber": 3, "status": true}
            }),
        )
        .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let receipt = client
            .send("0xcontract", "withdrawFundsPayee", &[json!("1")], "0xreceiver")
            .await
            .unwrap();
        assert_eq!(receipt.transaction_hash, "0xfeed");
        assert_eq!(receipt.block_number, Some(3));
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let mock_server = mock_rpc(
            "ledger_call",
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "execution reverted"}
            }),
        )
        .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let result = client.call("0xcontract", "getAmountOwed", &[json!("9")]).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Ledger error -32000 for method ledger_call: execution reverted"
        );
    }

    #[tokio::test]
    async fn test_http_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let result = client.call("0xcontract", "getAmountOwed", &[json!("1")]).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for method: ledger_call"
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = JsonRpcLedgerClient::new(&mock_server.uri(), RetryPolicy::none()).unwrap();
        let result = client.call("0xcontract", "getAmountOwed", &[json!("1")]).await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON-RPC response for ledger_call")
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retried_then_fails() {
        // port 9 (discard) is not listening on test hosts
        let client =
            JsonRpcLedgerClient::new("http://127.0.0.1:9", RetryPolicy::new(1, 1)).unwrap();
        let result = client.call("0xcontract", "getAmountOwed", &[json!("1")]).await;
        assert!(result.unwrap_err().to_string().starts_with("Request error:"));
    }
}
