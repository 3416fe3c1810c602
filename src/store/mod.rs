//! In-memory storage for per-agreement accrual snapshots.

pub mod memory;

pub use memory::SnapshotStore;
