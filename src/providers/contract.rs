use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::core::agreement::Agreement;
use crate::core::ledger::{BlockRange, EventRecord, LedgerClient, TransactionReceipt};
use crate::core::units::parse_raw_amount;

pub const ADD_AGREEMENT_EVENT: &str = "AddAgreement";

/// Typed facade over the agreement contract's methods.
#[derive(Clone)]
pub struct AgreementContract {
    ledger: Arc<dyn LedgerClient>,
    address: String,
}

impl AgreementContract {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: &str) -> Self {
        AgreementContract {
            ledger,
            address: address.to_string(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn get_amount_owed(&self, agreement_id: &str) -> Result<u128> {
        let value = self
            .ledger
            .call(&self.address, "getAmountOwed", &[json!(agreement_id)])
            .await
            .context("getAmountOwed failed")?;
        parse_amount(&value).context("getAmountOwed returned an invalid amount")
    }

    pub async fn get_interest_owed(&self, amount: u128) -> Result<u128> {
        let value = self
            .ledger
            .call(&self.address, "getInterestOwed", &[json!(amount.to_string())])
            .await
            .context("getInterestOwed failed")?;
        parse_amount(&value).context("getInterestOwed returned an invalid amount")
    }

    pub async fn get_total_owed(&self, agreement_id: &str) -> Result<u128> {
        let value = self
            .ledger
            .call(&self.address, "getTotalOwed", &[json!(agreement_id)])
            .await
            .context("getTotalOwed failed")?;
        parse_amount(&value).context("getTotalOwed returned an invalid amount")
    }

    pub async fn get_agreement(
        &self,
        agreement_id: &str,
        default_interest_rate: f64,
    ) -> Result<Agreement> {
        let value = self
            .ledger
            .call(&self.address, "getAgreement", &[json!(agreement_id)])
            .await
            .context("getAgreement failed")?;
        let fields = value
            .as_object()
            .ok_or_else(|| anyhow!("getAgreement returned a non-object: {value}"))?;
        let mut agreement = agreement_from_fields(fields, default_interest_rate)?;
        if agreement.agreement_id.is_empty() {
            agreement.agreement_id = agreement_id.to_string();
        }
        Ok(agreement)
    }

    pub async fn agreement_events(&self, from_block: u64) -> Result<Vec<EventRecord>> {
        let range = BlockRange::since(from_block);
        debug!(from_block, "Fetching agreement events");
        self.ledger
            .get_past_events(&self.address, ADD_AGREEMENT_EVENT, &range)
            .await
    }

    pub async fn create_agreement(
        &self,
        receiver: &str,
        annual_amount: u128,
        description: &str,
        from: &str,
    ) -> Result<TransactionReceipt> {
        let args = [
            json!(receiver),
            json!(annual_amount.to_string()),
            json!(description),
        ];
        let receipt = self
            .ledger
            .send(&self.address, "createAgreement", &args, from)
            .await
            .context("createAgreement failed")?;
        ensure_success(receipt, "createAgreement")
    }

    pub async fn supply(
        &self,
        agreement_id: &str,
        amount: u128,
        from: &str,
    ) -> Result<TransactionReceipt> {
        let args = [json!(agreement_id), json!(amount.to_string())];
        let receipt = self
            .ledger
            .send(&self.address, "supply", &args, from)
            .await
            .context("supply failed")?;
        ensure_success(receipt, "supply")
    }

    pub async fn withdraw_funds_payee(
        &self,
        agreement_id: &str,
        from: &str,
    ) -> Result<TransactionReceipt> {
        let receipt = self
            .ledger
            .send(&self.address, "withdrawFundsPayee", &[json!(agreement_id)], from)
            .await
            .context("withdrawFundsPayee failed")?;
        ensure_success(receipt, "withdrawFundsPayee")
    }
}

fn ensure_success(receipt: TransactionReceipt, method: &str) -> Result<TransactionReceipt> {
    if receipt.status {
        Ok(receipt)
    } else {
        Err(anyhow!(
            "{} reverted in transaction {}",
            method,
            receipt.transaction_hash
        ))
    }
}

/// Decodes a uint returned by the ledger: decimal string, `0x` hex string or
/// JSON number.
pub fn parse_amount(value: &Value) -> Result<u128> {
    match value {
        Value::String(s) => parse_raw_amount(s),
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| anyhow!("Amount is not a non-negative integer: {n}")),
        other => Err(anyhow!("Unexpected amount value: {other}")),
    }
}

fn parse_u64(value: &Value) -> Result<u64> {
    let amount = parse_amount(value)?;
    u64::try_from(amount).with_context(|| format!("Value out of range: {amount}"))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Maps an `AddAgreement` payload (or a `getAgreement` result) to an
/// [`Agreement`]. The ledger does not report an interest rate, so
/// `default_interest_rate` is used unless the payload carries one.
pub fn agreement_from_fields(
    fields: &Map<String, Value>,
    default_interest_rate: f64,
) -> Result<Agreement> {
    let annual_amount = fields
        .get("annualAmount")
        .ok_or_else(|| anyhow!("Missing annualAmount"))
        .and_then(parse_amount)
        .context("Invalid annualAmount")?;
    let start_date = match fields.get("startDate") {
        Some(v) => parse_u64(v).context("Invalid startDate")?,
        None => 0,
    };
    let interest_rate = match fields.get("interestRate") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| anyhow!("Invalid interestRate: {n}"))?,
        Some(Value::String(s)) => s
            .parse()
            .with_context(|| format!("Invalid interestRate: {s}"))?,
        _ => default_interest_rate,
    };

    Ok(Agreement {
        agreement_id: string_field(fields, "agreementId").unwrap_or_default(),
        payor: string_field(fields, "payor").unwrap_or_default(),
        receiver: string_field(fields, "receiver").unwrap_or_default(),
        annual_amount,
        start_date,
        interest_rate,
        description: string_field(fields, "description").unwrap_or_default(),
    })
}

pub fn agreement_from_event(event: &EventRecord, default_interest_rate: f64) -> Result<Agreement> {
    let agreement = agreement_from_fields(&event.return_values, default_interest_rate)?;
    if agreement.agreement_id.is_empty() {
        return Err(anyhow!("Event is missing agreementId"));
    }
    Ok(agreement)
}
