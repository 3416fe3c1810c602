//! Ledger query client abstraction.
//!
//! The engine never talks to the network directly; everything goes through a
//! [`LedgerClient`] injected at construction time.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    Latest,
}

impl Serialize for BlockTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockTag::Number(n) => serializer.serialize_u64(*n),
            BlockTag::Latest => serializer.serialize_str("latest"),
        }
    }
}

impl<'de> Deserialize<'de> for BlockTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Tag(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(BlockTag::Number(n)),
            Raw::Tag(tag) if tag == "latest" => Ok(BlockTag::Latest),
            Raw::Tag(tag) => Err(serde::de::Error::custom(format!(
                "unknown block tag: {tag}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    #[serde(rename = "fromBlock")]
    pub from: BlockTag,
    #[serde(rename = "toBlock")]
    pub to: BlockTag,
}

impl BlockRange {
    /// From `from_block` up to the current head.
    pub fn since(from_block: u64) -> Self {
        Self {
            from: BlockTag::Number(from_block),
            to: BlockTag::Latest,
        }
    }
}

/// A decoded contract event as returned by the ledger client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub event: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<u64>,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
    #[serde(rename = "returnValues", default)]
    pub return_values: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<u64>,
    #[serde(default = "default_status")]
    pub status: bool,
    #[serde(default)]
    pub events: HashMap<String, EventRecord>,
}

fn default_status() -> bool {
    true
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Historical events named `event` emitted by `contract` within `range`.
    async fn get_past_events(
        &self,
        contract: &str,
        event: &str,
        range: &BlockRange,
    ) -> Result<Vec<EventRecord>>;

    /// Read-only contract query.
    async fn call(&self, contract: &str, method: &str, args: &[Value]) -> Result<Value>;

    /// State-changing contract call signed by `from`.
    async fn send(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
        from: &str,
    ) -> Result<TransactionReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_range_serialization() {
        let range = BlockRange::since(1);
        assert_eq!(
            serde_json::to_value(range).unwrap(),
            json!({"fromBlock": 1, "toBlock": "latest"})
        );
        let parsed: BlockRange =
            serde_json::from_value(json!({"fromBlock": 5, "toBlock": 9})).unwrap();
        assert_eq!(parsed.to, BlockTag::Number(9));
    }

    #[test]
    fn test_event_record_defaults() {
        let record: EventRecord = serde_json::from_value(json!({
            "event": "AddAgreement",
            "returnValues": {"agreementId": "3"}
        }))
        .unwrap();
        assert_eq!(record.event, "AddAgreement");
        assert!(record.block_number.is_none());
        assert_eq!(record.return_values["agreementId"], json!("3"));
    }

    #[test]
    fn test_receipt_status_defaults_to_success() {
        let receipt: TransactionReceipt =
            serde_json::from_value(json!({"transactionHash": "0xabc"})).unwrap();
        assert!(receipt.status);
        assert!(receipt.events.is_empty());
    }
}
