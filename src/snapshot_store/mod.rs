//! Snapshot Store module
//!
//! Latest encoded state per aggregate. Snapshots are a cache over the event
//! stream: losing one only costs a longer replay.

mod memory;
mod postgres;

pub use memory::InMemorySnapshotStore;
pub use postgres::PgSnapshotStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event_store::StoreError;

/// Encoded aggregate state at a known version
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub version: i64,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Persistence for the most recent snapshot of each aggregate.
///
/// `save` never replaces a snapshot with an older one.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot, if any
    async fn load(&self, aggregate_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError>;

    /// Store a snapshot unless a newer one is already present
    async fn save(&self, snapshot: StoredSnapshot) -> Result<(), StoreError>;
}
