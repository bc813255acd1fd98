//! Event Store module
//!
//! Append-only, versioned persistence of events per aggregate.
//! Payloads are opaque bytes here; encoding belongs to the codec.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Event ready to be appended; its sequence number is assigned by position
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// Event as persisted in a stream
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub aggregate_id: Uuid,
    pub sequence_number: i64,
    pub transaction_id: Option<Uuid>,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// Conditional append to one stream
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub aggregate_id: Uuid,
    /// Version the stream must be at for the append to succeed
    pub expected_version: i64,
    pub events: Vec<NewEvent>,
    pub transaction_id: Option<Uuid>,
}

impl StreamAppend {
    pub fn new(aggregate_id: Uuid, expected_version: i64, events: Vec<NewEvent>) -> Self {
        Self {
            aggregate_id,
            expected_version,
            events,
            transaction_id: None,
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: Option<Uuid>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    /// Version the stream reaches if the append succeeds
    pub fn new_version(&self) -> i64 {
        self.expected_version + self.events.len() as i64
    }

    fn record(&self) -> impl Iterator<Item = RecordedEvent> + '_ {
        self.events.iter().enumerate().map(move |(idx, event)| RecordedEvent {
            aggregate_id: self.aggregate_id,
            sequence_number: self.expected_version + idx as i64 + 1,
            transaction_id: self.transaction_id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            recorded_at: event.recorded_at,
        })
    }
}

/// Append-only event storage with optimistic concurrency control.
///
/// Implementations must make `append_all` atomic across every stream in the
/// batch, and must reject a batch whose expected versions are stale with
/// `StoreError::ConcurrencyConflict`. Two concurrent appends with the same
/// expected version can never both succeed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append to a single stream; returns the new version
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<i64, StoreError> {
        let versions = self
            .append_all(vec![StreamAppend::new(aggregate_id, expected_version, events)])
            .await?;
        versions
            .first()
            .copied()
            .ok_or_else(|| StoreError::InvalidAppend("append returned no version".to_string()))
    }

    /// Atomically append to several streams; returns new versions in input order
    async fn append_all(&self, appends: Vec<StreamAppend>) -> Result<Vec<i64>, StoreError>;

    /// Events with sequence number greater than `from_version`, ascending
    async fn read_stream(&self, aggregate_id: Uuid, from_version: i64) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Whether any event in the stream was written under `transaction_id`
    async fn transaction_exists(&self, aggregate_id: Uuid, transaction_id: Uuid) -> Result<bool, StoreError>;
}

/// Reject batches that can never be applied
pub(crate) fn validate_appends(appends: &[StreamAppend]) -> Result<(), StoreError> {
    for (idx, append) in appends.iter().enumerate() {
        if append.events.is_empty() {
            return Err(StoreError::InvalidAppend(format!(
                "append for {} carries no events",
                append.aggregate_id
            )));
        }
        if append.expected_version < 0 {
            return Err(StoreError::InvalidAppend(format!(
                "negative expected version {} for {}",
                append.expected_version, append.aggregate_id
            )));
        }
        if appends[..idx].iter().any(|a| a.aggregate_id == append.aggregate_id) {
            return Err(StoreError::InvalidAppend(format!(
                "stream {} appears twice in one batch",
                append.aggregate_id
            )));
        }
    }
    Ok(())
}

/// Check that a stream read after `from_version` is contiguous and ascending
pub fn verify_stream(aggregate_id: Uuid, from_version: i64, events: &[RecordedEvent]) -> Result<(), StoreError> {
    let mut expected = from_version + 1;
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(StoreError::integrity(
                aggregate_id,
                format!("event {} belongs to stream {}", event.sequence_number, event.aggregate_id),
            ));
        }
        if event.sequence_number != expected {
            return Err(StoreError::integrity(
                aggregate_id,
                format!("expected sequence number {expected}, found {}", event.sequence_number),
            ));
        }
        expected += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(aggregate_id: Uuid, sequence_number: i64) -> RecordedEvent {
        RecordedEvent {
            aggregate_id,
            sequence_number,
            transaction_id: None,
            event_type: "AccountClosed".to_string(),
            payload: vec![1],
            recorded_at: Utc::now(),
        }
    }

    fn new_event() -> NewEvent {
        NewEvent {
            event_type: "AccountClosed".to_string(),
            payload: vec![1],
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_verify_contiguous_stream() {
        let id = Uuid::new_v4();
        let events = vec![recorded(id, 3), recorded(id, 4), recorded(id, 5)];
        assert!(verify_stream(id, 2, &events).is_ok());
        assert!(verify_stream(id, 7, &[]).is_ok());
    }

    #[test]
    fn test_verify_detects_gap() {
        let id = Uuid::new_v4();
        let events = vec![recorded(id, 1), recorded(id, 3)];
        let err = verify_stream(id, 0, &events).unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
    }

    #[test]
    fn test_verify_detects_out_of_order() {
        let id = Uuid::new_v4();
        let events = vec![recorded(id, 2), recorded(id, 1)];
        assert!(verify_stream(id, 0, &events).is_err());
    }

    #[test]
    fn test_verify_detects_foreign_event() {
        let id = Uuid::new_v4();
        let events = vec![recorded(Uuid::new_v4(), 1)];
        assert!(verify_stream(id, 0, &events).is_err());
    }

    #[test]
    fn test_stream_append_numbering() {
        let id = Uuid::new_v4();
        let append = StreamAppend::new(id, 4, vec![new_event(), new_event()]);
        assert_eq!(append.new_version(), 6);

        let numbers: Vec<i64> = append.record().map(|e| e.sequence_number).collect();
        assert_eq!(numbers, vec![5, 6]);
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_streams() {
        let id = Uuid::new_v4();
        assert!(validate_appends(&[StreamAppend::new(id, 0, vec![])]).is_err());
        assert!(validate_appends(&[StreamAppend::new(id, -1, vec![new_event()])]).is_err());
        assert!(validate_appends(&[
            StreamAppend::new(id, 0, vec![new_event()]),
            StreamAppend::new(id, 1, vec![new_event()]),
        ])
        .is_err());
        assert!(validate_appends(&[
            StreamAppend::new(id, 0, vec![new_event()]),
            StreamAppend::new(Uuid::new_v4(), 3, vec![new_event()]),
        ])
        .is_ok());
    }
}
