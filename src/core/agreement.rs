//! Agreement terms and the per-agreement accrual snapshot

use chrono::{DateTime, Utc};

use super::error::EngineError;

pub type AgreementId = String;

pub const DEFAULT_INTEREST_RATE: f64 = 0.04;

/// Start dates further than this ahead of the local clock are rejected.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Immutable terms of a recurring payment agreement as recorded by the
/// ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Agreement {
    pub agreement_id: AgreementId,
    pub payor: String,
    pub receiver: String,
    /// Raw smallest units payable per 365.25-day year.
    pub annual_amount: u128,
    /// Unix seconds. `0` means "now, at creation time".
    pub start_date: u64,
    pub interest_rate: f64,
    pub description: String,
}

impl Agreement {
    /// Checks the terms before any accrual computation runs.
    pub fn validate(&self, now_unix: f64) -> Result<(), EngineError> {
        if self.agreement_id.trim().is_empty() {
            return Err(EngineError::validation("agreement id is empty"));
        }
        if !self.interest_rate.is_finite() {
            return Err(EngineError::validation(format!(
                "interest rate is not a finite number for agreement {}",
                self.agreement_id
            )));
        }
        if self.interest_rate < 0.0 {
            return Err(EngineError::validation(format!(
                "interest rate {} is negative for agreement {}",
                self.interest_rate, self.agreement_id
            )));
        }
        if !now_unix.is_finite() || now_unix < 0.0 {
            return Err(EngineError::validation(format!(
                "clock reading {now_unix} is not a valid timestamp"
            )));
        }
        if self.start_date as f64 > now_unix + MAX_CLOCK_SKEW_SECS as f64 {
            return Err(EngineError::validation(format!(
                "start date {} of agreement {} is in the future",
                self.start_date, self.agreement_id
            )));
        }
        Ok(())
    }

    /// Resolves a zero start date, or one still ahead of `now_unix` within
    /// the tolerated skew, to `now_unix`. Past dates are kept.
    pub fn with_resolved_start(mut self, now_unix: f64) -> Self {
        if self.start_date == 0 || self.start_date as f64 > now_unix {
            self.start_date = now_unix.floor() as u64;
        }
        self
    }

    pub fn annual_amount_f64(&self) -> f64 {
        self.annual_amount as f64
    }
}

/// Latest known and estimated figures for one agreement. All amounts are raw
/// smallest units.
///
/// Each field has exactly one writer: the principal tick writes
/// `principal_accrued`, the interest tick writes `interest_accrued`, and the
/// reconciliation tick writes everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccrualSnapshot {
    pub principal_accrued: u128,
    pub interest_accrued: u128,
    pub on_chain_owed: Option<u128>,
    pub on_chain_interest: Option<u128>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl AccrualSnapshot {
    /// Applies the fields present in `update`, leaving the others untouched.
    pub fn merge(&mut self, update: SnapshotUpdate) {
        if let Some(v) = update.principal_accrued {
            self.principal_accrued = v;
        }
        if let Some(v) = update.interest_accrued {
            self.interest_accrued = v;
        }
        if let Some(v) = update.on_chain_owed {
            self.on_chain_owed = Some(v);
        }
        if let Some(v) = update.on_chain_interest {
            self.on_chain_interest = Some(v);
        }
        if let Some(v) = update.last_reconciled_at {
            self.last_reconciled_at = Some(v);
        }
        if let Some(v) = update.consecutive_failures {
            self.consecutive_failures = v;
        }
        if let Some(v) = update.last_error {
            self.last_error = v;
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.last_reconciled_at.is_some()
    }
}

/// Partial snapshot: `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotUpdate {
    pub principal_accrued: Option<u128>,
    pub interest_accrued: Option<u128>,
    pub on_chain_owed: Option<u128>,
    pub on_chain_interest: Option<u128>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<u32>,
    pub last_error: Option<Option<String>>,
}

impl SnapshotUpdate {
    pub fn principal(value: u128) -> Self {
        Self {
            principal_accrued: Some(value),
            ..Default::default()
        }
    }

    pub fn interest(value: u128) -> Self {
        Self {
            interest_accrued: Some(value),
            ..Default::default()
        }
    }

    pub fn reconciled(
        owed: u128,
        interest: Option<u128>,
        reconciled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            on_chain_owed: Some(owed),
            on_chain_interest: interest,
            last_reconciled_at: Some(reconciled_at),
            consecutive_failures: Some(0),
            last_error: Some(None),
            ..Default::default()
        }
    }

    pub fn reconcile_failed(consecutive_failures: u32, error: String) -> Self {
        Self {
            consecutive_failures: Some(consecutive_failures),
            last_error: Some(Some(error)),
            ..Default::default()
        }
    }
}
