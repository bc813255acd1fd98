//! Postgres Event Store
//!
//! Conditional append on top of the `events` table. The version check inside
//! the transaction rejects stale writers early; the `(aggregate_id,
//! sequence_number)` primary key is what finally serializes racing writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{validate_appends, verify_stream, EventStore, RecordedEvent, StoreError, StreamAppend};

/// SQLSTATEs that mean another writer got there first
const CONFLICT_CODES: [&str; 3] = [
    "23505", // unique_violation
    "40001", // serialization_failure
    "40P01", // deadlock_detected
];

/// Event Store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a new PgEventStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get current version of an aggregate
    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, StoreError> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(sequence_number) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(result.unwrap_or(0))
    }

    async fn insert_stream(
        tx: &mut Transaction<'_, Postgres>,
        append: &StreamAppend,
    ) -> Result<(), StoreError> {
        for event in append.record() {
            sqlx::query(
                r#"
                INSERT INTO events (
                    aggregate_id, sequence_number, transaction_id,
                    event_type, payload, recorded_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(event.aggregate_id)
            .bind(event.sequence_number)
            .bind(event.transaction_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.recorded_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| conflict_or_database(e, append))?;
        }
        Ok(())
    }
}

/// Map constraint and serialization failures to a concurrency conflict
fn conflict_or_database(err: sqlx::Error, append: &StreamAppend) -> StoreError {
    let is_conflict = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| CONFLICT_CODES.contains(&code.as_ref()));

    if is_conflict {
        StoreError::ConcurrencyConflict {
            aggregate_id: append.aggregate_id,
            expected: append.expected_version,
            actual: None,
        }
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append_all(&self, appends: Vec<StreamAppend>) -> Result<Vec<i64>, StoreError> {
        validate_appends(&appends)?;

        // Write streams in id order so concurrent batches take row locks in one order
        let mut order: Vec<usize> = (0..appends.len()).collect();
        order.sort_by_key(|&idx| appends[idx].aggregate_id);

        let mut tx = self.pool.begin().await?;

        for &idx in &order {
            let append = &appends[idx];
            let current = Self::current_version(&mut tx, append.aggregate_id).await?;
            if current != append.expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.expected_version,
                    actual: Some(current),
                });
            }
            Self::insert_stream(&mut tx, append).await?;
        }

        if let Err(e) = tx.commit().await {
            // Commit-time failure: attribute it to the first stream of the batch
            return Err(conflict_or_database(e, &appends[order[0]]));
        }

        tracing::debug!(streams = appends.len(), "Appended event batch");

        Ok(appends.iter().map(StreamAppend::new_version).collect())
    }

    async fn read_stream(&self, aggregate_id: Uuid, from_version: i64) -> Result<Vec<RecordedEvent>, StoreError> {
        let events: Vec<RecordedEvent> =
            sqlx::query_as::<_, (i64, Option<Uuid>, String, Vec<u8>, DateTime<Utc>)>(
                r#"
                SELECT sequence_number, transaction_id, event_type, payload, recorded_at
                FROM events
                WHERE aggregate_id = $1 AND sequence_number > $2
                ORDER BY sequence_number ASC
                "#,
            )
            .bind(aggregate_id)
            .bind(from_version)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(
                |(sequence_number, transaction_id, event_type, payload, recorded_at)| RecordedEvent {
                    aggregate_id,
                    sequence_number,
                    transaction_id,
                    event_type,
                    payload,
                    recorded_at,
                },
            )
            .collect();

        verify_stream(aggregate_id, from_version, &events)?;
        Ok(events)
    }

    async fn transaction_exists(&self, aggregate_id: Uuid, transaction_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM events WHERE aggregate_id = $1 AND transaction_id = $2
            )
            "#,
        )
        .bind(aggregate_id)
        .bind(transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
