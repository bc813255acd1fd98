//! Repository Errors

use uuid::Uuid;

use crate::codec::CodecError;
use crate::domain::RejectedCommand;
use crate::event_store::StoreError;

/// Errors surfaced by [`AggregateRepository`](super::AggregateRepository)
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Business rule violation; reported as-is, never retried
    #[error(transparent)]
    Rejected(#[from] RejectedCommand),

    /// Expected version is stale; reload and retry
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: Option<i64>,
    },

    #[error("Aggregate not found: {0}")]
    NotFound(Uuid),

    /// Event log is corrupted, out of sequence, or cannot be folded
    #[error("Store integrity error for aggregate {aggregate_id}: {reason}")]
    StoreIntegrity { aggregate_id: Uuid, reason: String },

    /// Payload failed authentication
    #[error("Payload tampered or corrupt: aggregate {aggregate_id}, sequence {sequence_number}")]
    TamperedOrCorrupt { aggregate_id: Uuid, sequence_number: i64 },

    /// Deadline passed before the backend answered; the write may or may not have landed
    #[error("Store call timed out; outcome unknown")]
    Timeout,

    /// Backend failure; the write may or may not have landed
    #[error("Backend error; outcome unknown: {0}")]
    Backend(#[source] sqlx::Error),

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] CodecError),
}

impl RepositoryError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::ConcurrencyConflict { .. })
    }

    /// The caller must reload state before deciding whether to retry
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, RepositoryError::Timeout | RepositoryError::Backend(_))
    }

    pub(crate) fn integrity(aggregate_id: Uuid, reason: impl Into<String>) -> Self {
        RepositoryError::StoreIntegrity {
            aggregate_id,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => RepositoryError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            StoreError::Integrity { aggregate_id, reason } => {
                RepositoryError::StoreIntegrity { aggregate_id, reason }
            }
            StoreError::InvalidAppend(reason) => RepositoryError::StoreIntegrity {
                aggregate_id: Uuid::nil(),
                reason,
            },
            StoreError::Database(e) => RepositoryError::Backend(e),
        }
    }
}
