//! Error taxonomy for the accrual engine.
//!
//! Transport and decoding problems inside collaborators travel as
//! `anyhow::Error`; the variants here mark the points where the engine
//! decides how a failure is handled.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed or out-of-range agreement terms. Raised before any
    /// calculator call.
    #[error("invalid agreement terms: {0}")]
    Validation(String),

    /// The authoritative ledger query failed. The previous authoritative
    /// figure stays in place and the next tick retries.
    #[error("reconciliation failed for agreement {agreement_id}: {reason}")]
    Reconciliation {
        agreement_id: String,
        reason: String,
    },

    /// The historical agreement event fetch failed.
    #[error("failed to load agreements: {0}")]
    Load(String),
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EngineError::Validation(reason.into())
    }

    pub fn reconciliation(agreement_id: &str, err: &anyhow::Error) -> Self {
        EngineError::Reconciliation {
            agreement_id: agreement_id.to_string(),
            reason: format!("{err:#}"),
        }
    }
}
