//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use ledger_es::codec::{EventCodec, MasterKey};
use ledger_es::event_store::{EventStore, InMemoryEventStore};
use ledger_es::repository::{SnapshotMode, SnapshotPolicy};
use ledger_es::snapshot_store::{InMemorySnapshotStore, SnapshotStore};
use ledger_es::{AccountCommand, AccountService, AggregateRepository, Amount, Balance, CommandContext};

pub const TEST_KEY: [u8; 32] = [7u8; 32];

pub fn encrypted_codec() -> EventCodec {
    EventCodec::encrypted(MasterKey::new(TEST_KEY))
}

pub fn inline_every(frequency: i64) -> SnapshotPolicy {
    SnapshotPolicy::new(frequency, SnapshotMode::Inline)
}

/// Service over in-memory stores, with handles on both stores
pub struct Harness {
    pub events: Arc<InMemoryEventStore>,
    pub snapshots: Arc<InMemorySnapshotStore>,
    pub service: AccountService,
}

pub fn harness(codec: EventCodec, policy: SnapshotPolicy) -> Harness {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let service = service_over(events.clone(), snapshots.clone(), codec, policy);
    Harness {
        events,
        snapshots,
        service,
    }
}

pub fn service_over(
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    codec: EventCodec,
    policy: SnapshotPolicy,
) -> AccountService {
    let repository = AggregateRepository::new(events, snapshots, Arc::new(codec)).with_snapshot_policy(policy);
    AccountService::new(repository)
}

pub fn amount(value: i64) -> Amount {
    Amount::from_integer(value).unwrap()
}

pub fn balance(value: i64) -> Balance {
    Balance::new(value.into()).unwrap()
}

/// Open a fresh account and return its id
pub async fn open_account(service: &AccountService, initial: i64) -> Uuid {
    let id = Uuid::new_v4();
    service
        .handle_command(id, 0, AccountCommand::open(Uuid::new_v4(), balance(initial)), &CommandContext::new())
        .await
        .unwrap();
    id
}

static MIGRATED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

/// Connect to DATABASE_URL and make sure the event store tables exist.
///
/// Tests share the database, so each one works on fresh aggregate ids
/// instead of truncating.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    MIGRATED
        .get_or_init(|| async {
            // Multi-statement script: run it through the simple query protocol
            pool.execute(include_str!("../../migrations/0001_event_store.sql"))
                .await
                .expect("Failed to apply migrations");
        })
        .await;

    pool
}
