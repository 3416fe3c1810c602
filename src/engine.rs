//! View-level facade tying the loader, poller and submitter together.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::agreement::{AccrualSnapshot, Agreement, AgreementId};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::ledger::{LedgerClient, TransactionReceipt};
use crate::core::wallet::AllowanceProvider;
use crate::loader::AgreementLoader;
use crate::poller::{PollerSettings, ReconciliationPoller};
use crate::providers::{
    AgreementContract, JsonRpcLedgerClient, RetryPolicy, StaticAccount, TokenAllowanceProvider,
};
use crate::store::SnapshotStore;
use crate::submit::{AgreementSubmitter, NewAgreement};

/// An agreement paired with its latest figures, as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementView {
    pub agreement: Agreement,
    pub snapshot: AccrualSnapshot,
}

pub struct Engine {
    contract: AgreementContract,
    loader: AgreementLoader,
    poller: ReconciliationPoller,
    submitter: AgreementSubmitter,
    default_interest_rate: f64,
    agreements: Mutex<BTreeMap<AgreementId, Agreement>>,
}

impl Engine {
    /// Builds an engine backed by the configured JSON-RPC gateway and the
    /// system clock.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = RetryPolicy::new(config.ledger.retries, config.ledger.retry_delay_ms);
        let ledger = JsonRpcLedgerClient::new(&config.ledger.url, retry)
            .context("Failed to create ledger client")?;
        Ok(Self::new(Arc::new(ledger), Arc::new(SystemClock), config))
    }

    pub fn new(ledger: Arc<dyn LedgerClient>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let contract = AgreementContract::new(Arc::clone(&ledger), &config.ledger.contract);
        let allowance = config.ledger.token.as_deref().map(|token| {
            Arc::new(TokenAllowanceProvider::new(Arc::clone(&ledger), token))
                as Arc<dyn AllowanceProvider>
        });

        Engine {
            loader: AgreementLoader::new(contract.clone(), config.from_block, config.interest_rate),
            poller: ReconciliationPoller::new(
                SnapshotStore::new(),
                contract.clone(),
                clock,
                PollerSettings::from(&config.polling),
            ),
            submitter: AgreementSubmitter::new(
                contract.clone(),
                Arc::new(StaticAccount::new(config.account.clone())),
                allowance,
                config.interest_rate,
            ),
            contract,
            default_interest_rate: config.interest_rate,
            agreements: Mutex::new(BTreeMap::new()),
        }
    }

    /// Historical agreements without starting any ticks. An unreachable
    /// ledger yields an empty list.
    pub async fn list(&self) -> Vec<Agreement> {
        self.loader.load().await
    }

    /// Loads every known agreement and starts watching each one. Agreements
    /// with invalid terms are skipped.
    pub async fn activate(&self) -> Vec<Agreement> {
        let mut watched = Vec::new();
        for agreement in self.loader.load().await {
            let agreement_id = agreement.agreement_id.clone();
            match self.watch(agreement).await {
                Ok(agreement) => watched.push(agreement),
                Err(err) => warn!(agreement_id, error = %err, "Not watching agreement"),
            }
        }
        info!(count = watched.len(), "Activated agreements");
        watched
    }

    /// Fetches a single agreement by id and starts watching it.
    pub async fn track(&self, agreement_id: &str) -> Result<Agreement> {
        let agreement = self
            .contract
            .get_agreement(agreement_id, self.default_interest_rate)
            .await
            .with_context(|| format!("Failed to fetch agreement {agreement_id}"))?;
        self.watch(agreement).await
    }

    /// Creates an agreement on the ledger and seeds its snapshot.
    pub async fn submit(&self, terms: &NewAgreement) -> Result<Agreement> {
        let agreement = self.submitter.submit(terms).await?;
        self.watch(agreement).await
    }

    pub async fn supply(&self, agreement_id: &str, amount: u128) -> Result<TransactionReceipt> {
        self.submitter.supply(agreement_id, amount).await
    }

    pub async fn withdraw(&self, agreement_id: &str) -> Result<TransactionReceipt> {
        self.submitter.withdraw(agreement_id).await
    }

    async fn watch(&self, agreement: Agreement) -> Result<Agreement> {
        let agreement = self.poller.watch(agreement).await?;
        self.agreements
            .lock()
            .await
            .insert(agreement.agreement_id.clone(), agreement.clone());
        Ok(agreement)
    }

    /// Stops the agreement's ticks and drops its snapshot.
    pub async fn stop_watching(&self, agreement_id: &str) -> Option<AccrualSnapshot> {
        self.agreements.lock().await.remove(agreement_id);
        self.poller.unwatch(agreement_id).await
    }

    /// Cancels every tick group. Nothing is written after this returns.
    pub async fn shutdown(&self) {
        self.poller.unwatch_all().await;
        self.agreements.lock().await.clear();
    }

    /// Watched agreements with their current snapshots, ordered by id.
    pub async fn views(&self) -> Vec<AgreementView> {
        let agreements: Vec<Agreement> = self.agreements.lock().await.values().cloned().collect();
        let mut views = Vec::with_capacity(agreements.len());
        for agreement in agreements {
            let snapshot = self
                .poller
                .store()
                .get(&agreement.agreement_id)
                .await
                .unwrap_or_default();
            views.push(AgreementView {
                agreement,
                snapshot,
            });
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::TokioClock;
    use crate::core::config::{LedgerConfig, PollingConfig};
    use crate::core::ledger::{BlockRange, EventRecord};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;

    const START: i64 = 1_700_000_000;

    struct FixtureLedger;

    fn event(id: &str, start: u64, annual: &str) -> EventRecord {
        EventRecord {
            event: "AddAgreement".to_string(),
            return_values: json!({
                "agreementId": id,
                "payor": "0xpayor",
                "receiver": "0xreceiver",
                "annualAmount": annual,
                "startDate": start.to_string(),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
            ..Default::default()
        }
    }

    #[async_trait]
    impl LedgerClient for FixtureLedger {
        async fn get_past_events(
            &self,
            _contract: &str,
            _event: &str,
            _range: &BlockRange,
        ) -> anyhow::Result<Vec<EventRecord>> {
            Ok(vec![
                event("1", START as u64, "1000000000000000000000"),
                // starts an hour in the future, rejected
                event("2", START as u64 + 3_600, "5"),
                event("3", 0, "2000000000000000000000"),
            ])
        }

        async fn call(&self, _contract: &str, method: &str, args: &[Value]) -> anyhow::Result<Value> {
            match method {
                "getAmountOwed" => Ok(json!("11")),
                "getInterestOwed" => Ok(json!("1")),
                "getAgreement" => Ok(json!({
                    "payor": "0xpayor",
                    "receiver": "0xreceiver",
                    "annualAmount": "7",
                    "startDate": START.to_string(),
                    "agreementId": args[0],
                })),
                other => Err(anyhow!("unexpected method {other}")),
            }
        }

        async fn send(
            &self,
            _contract: &str,
            method: &str,
            _args: &[Value],
            _from: &str,
        ) -> anyhow::Result<TransactionReceipt> {
            let mut events = HashMap::new();
            if method == "createAgreement" {
                events.insert("AddAgreement".to_string(), event("9", 0, "365"));
            }
            Ok(TransactionReceipt {
                transaction_hash: "0xtx".to_string(),
                status: true,
                events,
                ..Default::default()
            })
        }
    }

    fn engine() -> Engine {
        let config = AppConfig {
            ledger: LedgerConfig {
                url: "http://localhost:8545".to_string(),
                contract: "0xcontract".to_string(),
                token: None,
                retries: 0,
                retry_delay_ms: 0,
            },
            account: Some("0xpayor".to_string()),
            from_block: 1,
            interest_rate: 0.04,
            polling: PollingConfig::default(),
            display: Default::default(),
        };
        let clock = Arc::new(TokioClock::starting_at(Utc.timestamp_opt(START, 0).unwrap()));
        Engine::new(Arc::new(FixtureLedger), clock, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_watches_valid_agreements() {
        let engine = engine();
        let watched = engine.activate().await;
        let ids: Vec<&str> = watched.iter().map(|a| a.agreement_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        // zero start date resolved to now
        assert_eq!(watched[1].start_date, START as u64);

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let views = engine.views().await;
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].snapshot.on_chain_owed, Some(11));
        assert_eq!(views[0].snapshot.on_chain_interest, Some(1));
        assert!(views[1].snapshot.principal_accrued > 0);

        engine.shutdown().await;
        assert!(engine.views().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_and_stop_watching() {
        let engine = engine();
        let agreement = engine.track("12").await.unwrap();
        assert_eq!(agreement.agreement_id, "12");
        assert_eq!(agreement.annual_amount, 7);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(engine.stop_watching("12").await.is_some());
        assert!(engine.views().await.is_empty());
        assert!(engine.stop_watching("12").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_seeds_snapshot() {
        let engine = engine();
        let terms = NewAgreement {
            receiver: "0xreceiver".to_string(),
            annual_amount: 365,
            description: String::new(),
        };
        let agreement = engine.submit(&terms).await.unwrap();
        assert_eq!(agreement.agreement_id, "9");
        assert_eq!(agreement.start_date, START as u64);

        let views = engine.views().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].agreement, agreement);
        engine.shutdown().await;
    }
}
