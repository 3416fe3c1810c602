//! New agreement submission.

use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::agreement::Agreement;
use crate::core::ledger::TransactionReceipt;
use crate::core::wallet::{AccountProvider, AllowanceProvider};
use crate::providers::contract::{ADD_AGREEMENT_EVENT, AgreementContract, agreement_from_event};

#[derive(Debug, Clone, PartialEq)]
pub struct NewAgreement {
    pub receiver: String,
    /// Raw smallest units per year.
    pub annual_amount: u128,
    /// Content reference for the agreement's documentation.
    pub description: String,
}

pub struct AgreementSubmitter {
    contract: AgreementContract,
    account: Arc<dyn AccountProvider>,
    allowance: Option<Arc<dyn AllowanceProvider>>,
    default_interest_rate: f64,
}

impl AgreementSubmitter {
    pub fn new(
        contract: AgreementContract,
        account: Arc<dyn AccountProvider>,
        allowance: Option<Arc<dyn AllowanceProvider>>,
        default_interest_rate: f64,
    ) -> Self {
        AgreementSubmitter {
            contract,
            account,
            allowance,
            default_interest_rate,
        }
    }

    fn payor(&self) -> Result<String> {
        self.account
            .active_account()
            .ok_or_else(|| anyhow!("No active account configured"))
    }

    /// Checks that the payor can fund one year of the agreement.
    async fn ensure_funded(&self, payor: &str, annual_amount: u128) -> Result<()> {
        let Some(allowance) = &self.allowance else {
            debug!("No allowance provider configured, skipping funding check");
            return Ok(());
        };

        let balance = allowance
            .balance_of(payor)
            .await
            .context("Failed to read token balance")?;
        if balance < annual_amount {
            bail!("Insufficient token balance: {balance} < {annual_amount}");
        }

        let approved = allowance
            .allowance(payor, self.contract.address())
            .await
            .context("Failed to read token allowance")?;
        if approved < annual_amount {
            bail!("Insufficient token allowance: {approved} < {annual_amount}");
        }
        Ok(())
    }

    /// Sends `createAgreement` and decodes the created agreement from the
    /// receipt's `AddAgreement` event.
    pub async fn submit(&self, terms: &NewAgreement) -> Result<Agreement> {
        if terms.receiver.trim().is_empty() {
            bail!("Receiver address is required");
        }
        if terms.annual_amount == 0 {
            bail!("Annual amount must be positive");
        }

        let payor = self.payor()?;
        if payor.eq_ignore_ascii_case(&terms.receiver) {
            bail!("Payor and receiver must differ");
        }
        self.ensure_funded(&payor, terms.annual_amount).await?;

        let receipt = self
            .contract
            .create_agreement(
                &terms.receiver,
                terms.annual_amount,
                &terms.description,
                &payor,
            )
            .await?;
        let agreement = self.agreement_from_receipt(&receipt)?;

        info!(
            agreement_id = %agreement.agreement_id,
            tx = %receipt.transaction_hash,
            "Created agreement"
        );
        Ok(agreement)
    }

    fn agreement_from_receipt(&self, receipt: &TransactionReceipt) -> Result<Agreement> {
        let event = receipt.events.get(ADD_AGREEMENT_EVENT).ok_or_else(|| {
            anyhow!(
                "Transaction {} did not emit {}",
                receipt.transaction_hash,
                ADD_AGREEMENT_EVENT
            )
        })?;
        agreement_from_event(event, self.default_interest_rate)
    }

    pub async fn supply(&self, agreement_id: &str, amount: u128) -> Result<TransactionReceipt> {
        let payor = self.payor()?;
        self.ensure_funded(&payor, amount).await?;
        self.contract.supply(agreement_id, amount, &payor).await
    }

    /// Withdraws accrued funds to the receiver. The local estimate is not
    /// adjusted; the next reconciliation picks up the new owed amount.
    pub async fn withdraw(&self, agreement_id: &str) -> Result<TransactionReceipt> {
        let receiver = self.payor()?;
        self.contract
            .withdraw_funds_payee(agreement_id, &receiver)
            .await
    }
}
