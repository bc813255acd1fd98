//! Store Errors
//!
//! Error types shared by the event and snapshot stores.

use uuid::Uuid;

/// Errors that can occur in the event or snapshot store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict. `actual` is unknown when the
    /// conflict surfaced as a constraint violation at insert time.
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {}", display_actual(.actual))]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: Option<i64>,
    },

    /// Stored stream is out of sequence or otherwise inconsistent
    #[error("Integrity error in stream {aggregate_id}: {reason}")]
    Integrity { aggregate_id: Uuid, reason: String },

    /// Append request that can never succeed
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn display_actual(actual: &Option<i64>) -> String {
    actual.map_or_else(|| "a newer version".to_string(), |v| v.to_string())
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    pub(crate) fn integrity(aggregate_id: Uuid, reason: impl Into<String>) -> Self {
        StoreError::Integrity {
            aggregate_id,
            reason: reason.into(),
        }
    }
}
