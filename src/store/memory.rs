use crate::core::agreement::{AccrualSnapshot, AgreementId, SnapshotUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared map from agreement id to its latest snapshot.
///
/// A single lock guards the map, so every `upsert` is atomic per key even
/// on a multi-threaded runtime. No caller holds the lock across a network
/// call.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<Mutex<HashMap<AgreementId, AccrualSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `update` into the snapshot for `agreement_id`, creating an
    /// empty one first if absent. Returns the merged snapshot.
    pub async fn upsert(&self, agreement_id: &str, update: SnapshotUpdate) -> AccrualSnapshot {
        let mut snapshots = self.inner.lock().await;
        let snapshot = snapshots.entry(agreement_id.to_string()).or_default();
        snapshot.merge(update);
        debug!(agreement_id, "Snapshot UPSERT");
        snapshot.clone()
    }

    pub async fn get(&self, agreement_id: &str) -> Option<AccrualSnapshot> {
        let snapshots = self.inner.lock().await;
        snapshots.get(agreement_id).cloned()
    }

    pub async fn remove(&self, agreement_id: &str) -> Option<AccrualSnapshot> {
        let mut snapshots = self.inner.lock().await;
        let removed = snapshots.remove(agreement_id);
        debug!(agreement_id, found = removed.is_some(), "Snapshot REMOVE");
        removed
    }

    pub async fn contains(&self, agreement_id: &str) -> bool {
        self.inner.lock().await.contains_key(agreement_id)
    }

    /// Point-in-time copy of every snapshot.
    pub async fn all(&self) -> HashMap<AgreementId, AccrualSnapshot> {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
