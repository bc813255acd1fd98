//! In-memory snapshot store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SnapshotStore, StoredSnapshot};
use crate::event_store::StoreError;

/// In-memory snapshot store keeping the newest snapshot per aggregate
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<Uuid, StoredSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every stored snapshot
    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, aggregate_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(&aggregate_id).cloned())
    }

    async fn save(&self, snapshot: StoredSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().await;
        let stale = snapshots
            .get(&snapshot.aggregate_id)
            .is_some_and(|current| current.version >= snapshot.version);
        if !stale {
            snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }
}
