//! Core accrual abstractions and pure computations

pub mod accrual;
pub mod agreement;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod log;
pub mod units;
pub mod wallet;

// Re-export main types for cleaner imports
pub use agreement::{AccrualSnapshot, Agreement, AgreementId, SnapshotUpdate};
pub use clock::{Clock, SystemClock, TokioClock};
pub use error::EngineError;
pub use ledger::{BlockRange, BlockTag, EventRecord, LedgerClient, TransactionReceipt};
pub use wallet::{AccountProvider, AllowanceProvider};
