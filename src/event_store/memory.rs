//! In-Memory Event Store
//!
//! Streams kept behind one lock; used by tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{validate_appends, verify_stream, EventStore, RecordedEvent, StoreError, StreamAppend};

/// In-memory append-only event store.
///
/// Intended for tests and local development. The write lock makes every
/// batch atomic: all expected versions are checked before any event is pushed.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<Uuid, Vec<RecordedEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: Option<&Vec<RecordedEvent>>) -> i64 {
        stream
            .and_then(|events| events.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_all(&self, appends: Vec<StreamAppend>) -> Result<Vec<i64>, StoreError> {
        validate_appends(&appends)?;

        let mut streams = self.streams.write().await;

        for append in &appends {
            let current = Self::current_version(streams.get(&append.aggregate_id));
            if current != append.expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.expected_version,
                    actual: Some(current),
                });
            }
        }

        let mut versions = Vec::with_capacity(appends.len());
        for append in &appends {
            streams
                .entry(append.aggregate_id)
                .or_default()
                .extend(append.record());
            versions.push(append.new_version());
        }

        Ok(versions)
    }

    async fn read_stream(&self, aggregate_id: Uuid, from_version: i64) -> Result<Vec<RecordedEvent>, StoreError> {
        let streams = self.streams.read().await;
        let events: Vec<RecordedEvent> = streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence_number > from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        verify_stream(aggregate_id, from_version, &events)?;
        Ok(events)
    }

    async fn transaction_exists(&self, aggregate_id: Uuid, transaction_id: Uuid) -> Result<bool, StoreError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .is_some_and(|stream| stream.iter().any(|e| e.transaction_id == Some(transaction_id))))
    }
}
