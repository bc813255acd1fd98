//! Postgres Snapshot Store
//!
//! One row per aggregate in `snapshots`; an upsert never moves it backwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{SnapshotStore, StoredSnapshot};
use crate::event_store::StoreError;

/// Snapshot store backed by the `snapshots` table
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, aggregate_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError> {
        let row: Option<(String, i64, Vec<u8>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT aggregate_type, version, payload, created_at
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(aggregate_type, version, payload, created_at)| StoredSnapshot {
            aggregate_id,
            aggregate_type,
            version,
            payload,
            created_at,
        }))
    }

    async fn save(&self, snapshot: StoredSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id)
            DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                payload = EXCLUDED.payload,
                created_at = EXCLUDED.created_at
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id)
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version)
        .bind(&snapshot.payload)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "Snapshot saved"
        );

        Ok(())
    }
}
