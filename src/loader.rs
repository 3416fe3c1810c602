//! One-shot loading of known agreements from historical ledger events.

use tracing::{info, warn};

use crate::core::agreement::Agreement;
use crate::core::error::EngineError;
use crate::providers::contract::{AgreementContract, agreement_from_event};

pub struct AgreementLoader {
    contract: AgreementContract,
    from_block: u64,
    default_interest_rate: f64,
}

impl AgreementLoader {
    pub fn new(contract: AgreementContract, from_block: u64, default_interest_rate: f64) -> Self {
        AgreementLoader {
            contract,
            from_block,
            default_interest_rate,
        }
    }

    /// Fetches every `AddAgreement` event from the first relevant block to
    /// the head. Events that cannot be decoded are skipped with a warning.
    pub async fn try_load(&self) -> Result<Vec<Agreement>, EngineError> {
        let events = self
            .contract
            .agreement_events(self.from_block)
            .await
            .map_err(|e| EngineError::Load(format!("{e:#}")))?;

        let total = events.len();
        let agreements: Vec<Agreement> = events
            .iter()
            .filter_map(
                |event| match agreement_from_event(event, self.default_interest_rate) {
                    Ok(agreement) => Some(agreement),
                    Err(e) => {
                        warn!(
                            error = %e,
                            tx = ?event.transaction_hash,
                            "Skipping undecodable agreement event"
                        );
                        None
                    }
                },
            )
            .collect();

        info!(
            from_block = self.from_block,
            events = total,
            agreements = agreements.len(),
            "Loaded agreements"
        );
        Ok(agreements)
    }

    /// Like [`try_load`](Self::try_load) but a failed fetch yields an empty
    /// list and a diagnostic, so the caller shows zero agreements.
    pub async fn load(&self) -> Vec<Agreement> {
        match self.try_load().await {
            Ok(agreements) => agreements,
            Err(err) => {
                warn!(error = %err, "Agreement list unavailable");
                Vec::new()
            }
        }
    }
}
