//! Per-agreement recurring estimation and reconciliation.
//!
//! Every watched agreement gets three independent tokio tasks:
//!
//! - a principal tick recomputing linear accrual,
//! - an interest tick recomputing the compounded annuity,
//! - a reconciliation tick fetching authoritative figures from the ledger.
//!
//! The local ticks never wait on the ledger, so a slow or failing endpoint
//! cannot stall the live estimate. The three tasks are registered together
//! under the agreement id and cancelled together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::accrual;
use crate::core::agreement::{AccrualSnapshot, Agreement, AgreementId, SnapshotUpdate};
use crate::core::clock::Clock;
use crate::core::config::{PollingConfig, ReconcileMode};
use crate::core::error::EngineError;
use crate::core::units;
use crate::providers::contract::AgreementContract;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub estimate_interval: Duration,
    pub interest_interval: Duration,
    pub reconcile_interval: Duration,
    pub mode: ReconcileMode,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollerSettings {
    fn from(config: &PollingConfig) -> Self {
        PollerSettings {
            estimate_interval: config.estimate_interval(),
            interest_interval: config.interest_interval(),
            reconcile_interval: config.reconcile_interval(),
            mode: config.reconcile_mode,
        }
    }
}

/// Terms as the ticks see them, with the start date already resolved.
#[derive(Debug)]
struct WatchedTerms {
    agreement_id: AgreementId,
    annual_amount: f64,
    start_date: u64,
    interest_rate: f64,
}

struct TickGroup {
    principal: JoinHandle<()>,
    interest: JoinHandle<()>,
    reconcile: JoinHandle<()>,
}

impl TickGroup {
    fn abort(&self) {
        self.principal.abort();
        self.interest.abort();
        self.reconcile.abort();
    }

    /// Aborts all three tasks and waits until none of them can run again.
    async fn cancel(self) {
        self.abort();
        for handle in [self.principal, self.interest, self.reconcile] {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    warn!(error = %err, "Tick task panicked");
                }
            }
        }
    }
}

pub struct ReconciliationPoller {
    store: SnapshotStore,
    contract: AgreementContract,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
    ticks: Mutex<HashMap<AgreementId, TickGroup>>,
}

impl ReconciliationPoller {
    pub fn new(
        store: SnapshotStore,
        contract: AgreementContract,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        ReconciliationPoller {
            store,
            contract,
            clock,
            settings,
            ticks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Validates `agreement`, seeds its snapshot and starts its ticks.
    ///
    /// Returns the agreement with a zero start date resolved to now. Watching
    /// an agreement that is already watched leaves the running ticks alone.
    pub async fn watch(&self, agreement: Agreement) -> Result<Agreement, EngineError> {
        let now = self.clock.unix_seconds();
        agreement.validate(now)?;
        let agreement = agreement.with_resolved_start(now);

        let mut ticks = self.ticks.lock().await;
        if ticks.contains_key(&agreement.agreement_id) {
            debug!(agreement_id = %agreement.agreement_id, "Agreement already watched");
            return Ok(agreement);
        }

        self.store
            .upsert(&agreement.agreement_id, SnapshotUpdate::default())
            .await;

        let terms = Arc::new(WatchedTerms {
            agreement_id: agreement.agreement_id.clone(),
            annual_amount: agreement.annual_amount_f64(),
            start_date: agreement.start_date,
            interest_rate: agreement.interest_rate,
        });

        let group = TickGroup {
            principal: tokio::spawn(run_principal_ticks(
                Arc::clone(&terms),
                self.store.clone(),
                Arc::clone(&self.clock),
                self.settings.estimate_interval,
            )),
            interest: tokio::spawn(run_interest_ticks(
                Arc::clone(&terms),
                self.store.clone(),
                Arc::clone(&self.clock),
                self.settings.interest_interval,
            )),
            reconcile: tokio::spawn(run_reconcile_ticks(
                Arc::clone(&terms),
                self.store.clone(),
                self.contract.clone(),
                Arc::clone(&self.clock),
                self.settings.reconcile_interval,
                self.settings.mode,
            )),
        };
        ticks.insert(agreement.agreement_id.clone(), group);

        info!(
            agreement_id = %agreement.agreement_id,
            start_date = agreement.start_date,
            interest_rate = agreement.interest_rate,
            "Watching agreement"
        );
        Ok(agreement)
    }

    /// Stops the agreement's ticks and keeps its last snapshot. Returns
    /// `false` if it was not watched.
    pub async fn cancel(&self, agreement_id: &str) -> bool {
        let group = self.ticks.lock().await.remove(agreement_id);
        match group {
            Some(group) => {
                group.cancel().await;
                info!(agreement_id, "Stopped agreement ticks");
                true
            }
            None => false,
        }
    }

    /// Stops the agreement's ticks and discards its snapshot, returning the
    /// final figures.
    pub async fn unwatch(&self, agreement_id: &str) -> Option<AccrualSnapshot> {
        self.cancel(agreement_id).await;
        self.store.remove(agreement_id).await
    }

    pub async fn unwatch_all(&self) {
        let groups: Vec<(AgreementId, TickGroup)> = self.ticks.lock().await.drain().collect();
        for (agreement_id, group) in groups {
            group.cancel().await;
            self.store.remove(&agreement_id).await;
        }
        info!("Stopped all agreement ticks");
    }

    pub async fn is_watching(&self, agreement_id: &str) -> bool {
        self.ticks.lock().await.contains_key(agreement_id)
    }

    pub async fn watched(&self) -> Vec<AgreementId> {
        let mut ids: Vec<AgreementId> = self.ticks.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for ReconciliationPoller {
    fn drop(&mut self) {
        for group in self.ticks.get_mut().values() {
            group.abort();
        }
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run_principal_ticks(
    terms: Arc<WatchedTerms>,
    store: SnapshotStore,
    clock: Arc<dyn Clock>,
    period: Duration,
) {
    let mut interval = new_interval(period);
    loop {
        interval.tick().await;
        let elapsed = units::seconds_since(terms.start_date, clock.as_ref());
        let principal = accrual::linear_accrual_units(terms.annual_amount, elapsed);
        store
            .upsert(&terms.agreement_id, SnapshotUpdate::principal(principal))
            .await;
        debug!(agreement_id = %terms.agreement_id, elapsed, principal = %principal, "Principal tick");
    }
}

async fn run_interest_ticks(
    terms: Arc<WatchedTerms>,
    store: SnapshotStore,
    clock: Arc<dyn Clock>,
    period: Duration,
) {
    let mut interval = new_interval(period);
    loop {
        interval.tick().await;
        let elapsed = units::seconds_since(terms.start_date, clock.as_ref());
        let interest =
            accrual::accrued_interest_units(terms.annual_amount, terms.interest_rate, elapsed);
        store
            .upsert(&terms.agreement_id, SnapshotUpdate::interest(interest))
            .await;
        debug!(agreement_id = %terms.agreement_id, elapsed, interest = %interest, "Interest tick");
    }
}

async fn run_reconcile_ticks(
    terms: Arc<WatchedTerms>,
    store: SnapshotStore,
    contract: AgreementContract,
    clock: Arc<dyn Clock>,
    period: Duration,
    mode: ReconcileMode,
) {
    let mut interval = new_interval(period);
    // only this task writes the failure fields
    let mut failures: u32 = 0;
    loop {
        interval.tick().await;
        let agreement_id = terms.agreement_id.as_str();
        match fetch_authoritative(agreement_id, &store, &contract, mode).await {
            Ok((owed, interest)) => {
                failures = 0;
                store
                    .upsert(
                        agreement_id,
                        SnapshotUpdate::reconciled(owed, interest, clock.now()),
                    )
                    .await;
                debug!(agreement_id, owed = %owed, "Reconciled with ledger");
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                warn!(
                    agreement_id,
                    consecutive_failures = failures,
                    error = %err,
                    "Reconciliation failed, keeping last authoritative figures"
                );
                store
                    .upsert(
                        agreement_id,
                        SnapshotUpdate::reconcile_failed(failures, err.to_string()),
                    )
                    .await;
            }
        }
    }
}

/// Queries the ledger for the agreement's authoritative figures: amount
/// owed and, in split mode, interest owed on the current principal estimate.
async fn fetch_authoritative(
    agreement_id: &str,
    store: &SnapshotStore,
    contract: &AgreementContract,
    mode: ReconcileMode,
) -> Result<(u128, Option<u128>), EngineError> {
    let fetched = match mode {
        ReconcileMode::Split => {
            let principal = store
                .get(agreement_id)
                .await
                .map(|s| s.principal_accrued)
                .unwrap_or_default();
            match contract.get_amount_owed(agreement_id).await {
                Ok(owed) => contract
                    .get_interest_owed(principal)
                    .await
                    .map(|interest| (owed, Some(interest))),
                Err(err) => Err(err),
            }
        }
        ReconcileMode::Total => contract
            .get_total_owed(agreement_id)
            .await
            .map(|total| (total, None)),
    };
    fetched.map_err(|err| EngineError::reconciliation(agreement_id, &err))
}
