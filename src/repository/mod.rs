//! Aggregate Repository
//!
//! Loads aggregates from snapshot plus newer events and commits the events
//! their decisions produce. Every store call runs against the caller's
//! deadline.

mod error;
mod policy;

pub use error::RepositoryError;
pub use policy::{SnapshotMode, SnapshotPolicy, DEFAULT_SNAPSHOT_FREQUENCY};

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::codec::{CodecError, EventCodec, PayloadScope};
use crate::domain::CommandContext;
use crate::event_store::{EventStore, NewEvent, RecordedEvent, StoreError, StreamAppend};
use crate::snapshot_store::{SnapshotStore, StoredSnapshot};

/// Deadline applied when the caller does not supply one
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Aggregate state together with the snapshot it was rebuilt from
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub state: A,
    /// Version of the snapshot used, 0 when replayed from the start
    pub snapshot_version: i64,
}

impl<A: Aggregate> Loaded<A> {
    pub fn version(&self) -> i64 {
        self.state.version()
    }
}

/// Events decided against a loaded state, waiting to be committed
pub struct PendingChange<A: Aggregate> {
    pub loaded: Loaded<A>,
    pub events: Vec<A::Event>,
}

impl<A: Aggregate> PendingChange<A> {
    pub fn new(loaded: Loaded<A>, events: Vec<A::Event>) -> Self {
        Self { loaded, events }
    }
}

/// Decoded event with its stream metadata
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry<E> {
    pub sequence_number: i64,
    pub transaction_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    pub event: E,
}

/// Repository for one aggregate type
#[derive(Clone)]
pub struct AggregateRepository<A> {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    codec: Arc<EventCodec>,
    policy: SnapshotPolicy,
    default_timeout: Duration,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateRepository<A> {
    pub fn new(events: Arc<dyn EventStore>, snapshots: Arc<dyn SnapshotStore>, codec: Arc<EventCodec>) -> Self {
        Self {
            events,
            snapshots,
            codec,
            policy: SnapshotPolicy::default(),
            default_timeout: DEFAULT_STORE_TIMEOUT,
            _aggregate: PhantomData,
        }
    }

    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        self.policy
    }

    /// Copy of `ctx` with its deadline fixed, so multi-step operations share one budget
    pub fn bounded(&self, ctx: &CommandContext) -> CommandContext {
        let mut ctx = ctx.clone();
        ctx.deadline = Some(self.deadline(ctx.deadline));
        ctx
    }

    fn deadline(&self, deadline: Option<Instant>) -> Instant {
        deadline.unwrap_or_else(|| Instant::now() + self.default_timeout)
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Rebuild current state from the latest usable snapshot plus newer events
    pub async fn load(&self, aggregate_id: Uuid, ctx: &CommandContext) -> Result<Loaded<A>, RepositoryError> {
        let deadline = self.deadline(ctx.deadline);

        let (state, snapshot_version, records) = match self.load_snapshot(aggregate_id, deadline).await? {
            Some(state) => {
                let version = state.version();
                // Read from the snapshot's own event so the log must confirm it
                let mut records = within(deadline, self.events.read_stream(aggregate_id, version - 1)).await?;
                if records.first().map(|r| r.sequence_number) == Some(version) {
                    records.remove(0);
                    (state, version, records)
                } else {
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        snapshot_version = version,
                        "Discarding snapshot the event log does not reach, replaying from the start"
                    );
                    let records = within(deadline, self.events.read_stream(aggregate_id, 0)).await?;
                    (A::initial(aggregate_id), 0, records)
                }
            }
            None => {
                let records = within(deadline, self.events.read_stream(aggregate_id, 0)).await?;
                (A::initial(aggregate_id), 0, records)
            }
        };

        let replayed = records.len();
        let state = self.replay(state, &records)?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            version = state.version(),
            snapshot_version,
            replayed,
            correlation_id = ?ctx.correlation_id,
            "Loaded {} aggregate",
            A::aggregate_type()
        );

        Ok(Loaded {
            state,
            snapshot_version,
        })
    }

    /// Current state; `NotFound` for a stream with no events
    pub async fn query(&self, aggregate_id: Uuid, ctx: &CommandContext) -> Result<A, RepositoryError> {
        let loaded = self.load(aggregate_id, ctx).await?;
        if loaded.version() == 0 {
            return Err(RepositoryError::NotFound(aggregate_id));
        }
        Ok(loaded.state)
    }

    /// Every event of the stream, decoded, oldest first
    pub async fn history(
        &self,
        aggregate_id: Uuid,
        ctx: &CommandContext,
    ) -> Result<Vec<HistoryEntry<A::Event>>, RepositoryError> {
        let deadline = self.deadline(ctx.deadline);
        let records = within(deadline, self.events.read_stream(aggregate_id, 0)).await?;
        if records.is_empty() {
            return Err(RepositoryError::NotFound(aggregate_id));
        }

        records
            .iter()
            .map(|record| {
                Ok(HistoryEntry {
                    sequence_number: record.sequence_number,
                    transaction_id: record.transaction_id,
                    recorded_at: record.recorded_at,
                    event: self.decode_event(record)?,
                })
            })
            .collect()
    }

    /// Snapshot state, or `None` when absent or unusable
    async fn load_snapshot(&self, aggregate_id: Uuid, deadline: Instant) -> Result<Option<A>, RepositoryError> {
        let Some(snapshot) = within(deadline, self.snapshots.load(aggregate_id)).await? else {
            return Ok(None);
        };

        if snapshot.aggregate_type != A::aggregate_type() {
            tracing::warn!(
                aggregate_id = %aggregate_id,
                found = %snapshot.aggregate_type,
                "Discarding snapshot of another aggregate type"
            );
            return Ok(None);
        }

        let scope = PayloadScope::snapshot(aggregate_id, snapshot.version);
        match self.codec.decode::<A>(&scope, &snapshot.payload) {
            Ok(state) if state.id() == aggregate_id && state.version() == snapshot.version => Ok(Some(state)),
            Ok(state) => {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    snapshot_version = snapshot.version,
                    state_id = %state.id(),
                    state_version = state.version(),
                    "Discarding snapshot that does not match its key"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    snapshot_version = snapshot.version,
                    error = %e,
                    "Discarding undecodable snapshot, replaying from the start"
                );
                Ok(None)
            }
        }
    }

    fn replay(&self, state: A, records: &[RecordedEvent]) -> Result<A, RepositoryError> {
        records.iter().try_fold(state, |state, record| {
            let event = self.decode_event(record)?;
            let state = state.apply(&event).map_err(|violation| {
                integrity_failure(
                    record.aggregate_id,
                    format!("event {} cannot be applied: {violation}", record.sequence_number),
                )
            })?;

            if state.version() != record.sequence_number {
                return Err(integrity_failure(
                    record.aggregate_id,
                    format!(
                        "state version {} after applying event {}",
                        state.version(),
                        record.sequence_number
                    ),
                ));
            }
            Ok(state)
        })
    }

    fn decode_event(&self, record: &RecordedEvent) -> Result<A::Event, RepositoryError> {
        let scope = PayloadScope::event(record.aggregate_id, record.sequence_number, &record.event_type);

        let event: A::Event = self.codec.decode(&scope, &record.payload).map_err(|e| match e {
            CodecError::TamperedOrCorrupt => {
                tracing::error!(
                    aggregate_id = %record.aggregate_id,
                    sequence_number = record.sequence_number,
                    "Event payload failed authentication"
                );
                RepositoryError::TamperedOrCorrupt {
                    aggregate_id: record.aggregate_id,
                    sequence_number: record.sequence_number,
                }
            }
            other => integrity_failure(
                record.aggregate_id,
                format!("event {} does not decode: {other}", record.sequence_number),
            ),
        })?;

        if event.event_type() != record.event_type {
            return Err(integrity_failure(
                record.aggregate_id,
                format!(
                    "event {} recorded as {} but decodes as {}",
                    record.sequence_number,
                    record.event_type,
                    event.event_type()
                ),
            ));
        }
        Ok(event)
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Decide `command` against the state at `expected_version` and append the result.
    ///
    /// A stale `expected_version` is reported as `ConcurrencyConflict` and never
    /// retried here. A command whose transaction id is already in the stream
    /// returns the current version without appending.
    pub async fn execute(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        command: &A::Command,
        ctx: &CommandContext,
    ) -> Result<i64, RepositoryError> {
        let ctx = self.bounded(ctx);
        let loaded = self.load(aggregate_id, &ctx).await?;

        if self.is_duplicate(aggregate_id, &ctx).await? {
            tracing::info!(
                aggregate_id = %aggregate_id,
                transaction_id = ?ctx.transaction_id,
                version = loaded.version(),
                "Duplicate transaction, nothing appended"
            );
            return Ok(loaded.version());
        }

        if loaded.version() != expected_version {
            return Err(RepositoryError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: Some(loaded.version()),
            });
        }

        let events = loaded.state.decide(command)?;
        let versions = self.commit(vec![PendingChange::new(loaded, events)], &ctx).await?;

        versions
            .first()
            .copied()
            .ok_or_else(|| integrity_failure(aggregate_id, "commit returned no version"))
    }

    /// Whether the context's transaction id already appears in the stream
    pub async fn is_duplicate(&self, aggregate_id: Uuid, ctx: &CommandContext) -> Result<bool, RepositoryError> {
        match ctx.transaction_id {
            Some(transaction_id) => {
                let deadline = self.deadline(ctx.deadline);
                within(deadline, self.events.transaction_exists(aggregate_id, transaction_id)).await
            }
            None => Ok(false),
        }
    }

    /// Atomically append the events of every change; returns new versions in input order.
    ///
    /// Each change is appended at the version it was loaded at, so either all
    /// streams advance or the whole batch fails.
    pub async fn commit(
        &self,
        changes: Vec<PendingChange<A>>,
        ctx: &CommandContext,
    ) -> Result<Vec<i64>, RepositoryError> {
        let deadline = self.deadline(ctx.deadline);
        let recorded_at = Utc::now();

        let mut versions = Vec::with_capacity(changes.len());
        let mut appends = Vec::new();
        let mut committed = Vec::new();

        for change in changes {
            let aggregate_id = change.loaded.state.id();
            let expected_version = change.loaded.version();
            versions.push(expected_version);

            if change.events.is_empty() {
                continue;
            }

            let state = change
                .loaded
                .state
                .apply_all(&change.events)
                .map_err(|violation| integrity_failure(aggregate_id, violation.to_string()))?;

            let events = change
                .events
                .iter()
                .enumerate()
                .map(|(idx, event)| {
                    let sequence_number = expected_version + idx as i64 + 1;
                    let scope = PayloadScope::event(aggregate_id, sequence_number, event.event_type());
                    Ok(NewEvent {
                        event_type: event.event_type().to_string(),
                        payload: self.codec.encode(&scope, event).map_err(RepositoryError::Encode)?,
                        recorded_at,
                    })
                })
                .collect::<Result<Vec<_>, RepositoryError>>()?;

            appends.push(StreamAppend::new(aggregate_id, expected_version, events).with_transaction_id(ctx.transaction_id));
            committed.push((versions.len() - 1, state, change.loaded.snapshot_version));
        }

        if appends.is_empty() {
            return Ok(versions);
        }

        let new_versions = within(deadline, self.events.append_all(appends))
            .await
            .inspect_err(|e| {
                if e.is_concurrency_conflict() {
                    tracing::debug!(error = %e, correlation_id = ?ctx.correlation_id, "Append rejected");
                }
            })?;

        for ((idx, state, snapshot_version), new_version) in committed.into_iter().zip(new_versions) {
            tracing::debug!(
                aggregate_id = %state.id(),
                version = new_version,
                correlation_id = ?ctx.correlation_id,
                "Appended {} events",
                A::aggregate_type()
            );
            versions[idx] = new_version;
            self.after_commit(state, snapshot_version, deadline).await;
        }

        Ok(versions)
    }

    /// Schedule a snapshot if the policy says one is due. Never fails the command.
    async fn after_commit(&self, state: A, last_snapshot_version: i64, deadline: Instant) {
        if !self.policy.is_due(last_snapshot_version, state.version()) {
            return;
        }

        let snapshots = Arc::clone(&self.snapshots);
        let codec = Arc::clone(&self.codec);

        match self.policy.mode {
            SnapshotMode::Inline => write_snapshot(snapshots, codec, state, deadline).await,
            SnapshotMode::Background => {
                let deadline = Instant::now() + self.default_timeout;
                tokio::spawn(write_snapshot(snapshots, codec, state, deadline));
            }
        }
    }
}

/// Best-effort snapshot write; failures only cost replay time
async fn write_snapshot<A: Aggregate>(
    snapshots: Arc<dyn SnapshotStore>,
    codec: Arc<EventCodec>,
    state: A,
    deadline: Instant,
) {
    let aggregate_id = state.id();
    let version = state.version();

    let payload = match codec.encode(&PayloadScope::snapshot(aggregate_id, version), &state) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(aggregate_id = %aggregate_id, version, error = %e, "Snapshot encoding failed");
            return;
        }
    };

    let snapshot = StoredSnapshot {
        aggregate_id,
        aggregate_type: A::aggregate_type().to_string(),
        version,
        payload,
        created_at: Utc::now(),
    };

    match within(deadline, snapshots.save(snapshot)).await {
        Ok(()) => tracing::info!(
            "Snapshot saved for {} aggregate {} at version {}",
            A::aggregate_type(),
            aggregate_id,
            version
        ),
        Err(e) => tracing::warn!(aggregate_id = %aggregate_id, version, error = %e, "Snapshot write failed"),
    }
}

/// Run a store call against a deadline
async fn within<T, F>(deadline: Instant, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result.map_err(|e| {
            if let StoreError::Integrity { aggregate_id, reason } = &e {
                tracing::error!(aggregate_id = %aggregate_id, reason = %reason, "Event stream integrity check failed");
            }
            RepositoryError::from(e)
        }),
        Err(_) => Err(RepositoryError::Timeout),
    }
}

fn integrity_failure(aggregate_id: Uuid, reason: impl Into<String>) -> RepositoryError {
    let reason = reason.into();
    tracing::error!(aggregate_id = %aggregate_id, reason = %reason, "Store integrity error");
    RepositoryError::integrity(aggregate_id, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Account;
    use crate::codec::MasterKey;
    use crate::domain::{AccountCommand, Amount, Balance, RejectedCommand};
    use crate::event_store::InMemoryEventStore;
    use crate::snapshot_store::InMemorySnapshotStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        events: Arc<InMemoryEventStore>,
        snapshots: Arc<InMemorySnapshotStore>,
        repository: AggregateRepository<Account>,
    }

    fn fixture(frequency: i64, codec: EventCodec) -> Fixture {
        let events = Arc::new(InMemoryEventStore::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let repository = AggregateRepository::new(events.clone(), snapshots.clone(), Arc::new(codec))
            .with_snapshot_policy(SnapshotPolicy::new(frequency, SnapshotMode::Inline));
        Fixture {
            events,
            snapshots,
            repository,
        }
    }

    fn amount(value: i64) -> Amount {
        Amount::from_integer(value).unwrap()
    }

    async fn open(repository: &AggregateRepository<Account>, id: Uuid, balance: i64) {
        let command = AccountCommand::open(Uuid::new_v4(), Balance::new(balance.into()).unwrap());
        repository.execute(id, 0, &command, &CommandContext::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let f = fixture(50, EventCodec::plain());
        let id = Uuid::new_v4();
        let ctx = CommandContext::new();

        open(&f.repository, id, 100).await;
        let version = f
            .repository
            .execute(id, 1, &AccountCommand::deposit(amount(50)), &ctx)
            .await
            .unwrap();
        assert_eq!(version, 2);

        let account = f.repository.query(id, &ctx).await.unwrap();
        assert_eq!(account.version(), 2);
        assert_eq!(account.balance().value(), dec!(150));
    }

    #[tokio::test]
    async fn test_query_unknown_is_not_found() {
        let f = fixture(50, EventCodec::plain());
        let id = Uuid::new_v4();
        let ctx = CommandContext::new();

        assert!(matches!(f.repository.query(id, &ctx).await, Err(RepositoryError::NotFound(x)) if x == id));
        assert!(matches!(f.repository.history(id, &ctx).await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts_before_deciding() {
        let f = fixture(50, EventCodec::plain());
        let id = Uuid::new_v4();
        open(&f.repository, id, 100).await;

        let err = f
            .repository
            .execute(id, 0, &AccountCommand::withdraw(amount(500)), &CommandContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::ConcurrencyConflict {
                expected: 0,
                actual: Some(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rejection_appends_nothing() {
        let f = fixture(50, EventCodec::plain());
        let id = Uuid::new_v4();
        open(&f.repository, id, 100).await;

        let err = f
            .repository
            .execute(id, 1, &AccountCommand::withdraw(amount(200)), &CommandContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Rejected(RejectedCommand::InsufficientFunds { .. })));
        assert_eq!(f.events.read_stream(id, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inline_snapshot_written_at_frequency() {
        let f = fixture(2, EventCodec::plain());
        let id = Uuid::new_v4();
        let ctx = CommandContext::new();

        open(&f.repository, id, 10).await;
        assert!(f.snapshots.load(id).await.unwrap().is_none());

        f.repository.execute(id, 1, &AccountCommand::deposit(amount(5)), &ctx).await.unwrap();
        assert_eq!(f.snapshots.load(id).await.unwrap().unwrap().version, 2);

        f.repository.execute(id, 2, &AccountCommand::deposit(amount(5)), &ctx).await.unwrap();
        assert_eq!(f.snapshots.load(id).await.unwrap().unwrap().version, 2);

        let loaded = f.repository.load(id, &ctx).await.unwrap();
        assert_eq!(loaded.snapshot_version, 2);
        assert_eq!(loaded.version(), 3);
        assert_eq!(loaded.state.balance().value(), dec!(20));
    }

    #[tokio::test]
    async fn test_mismatched_snapshot_is_discarded() {
        let f = fixture(1, EventCodec::plain());
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        open(&f.repository, id, 10).await;
        open(&f.repository, other, 99).await;

        // Snapshot of another aggregate stored under this id
        let mut foreign = f.snapshots.load(other).await.unwrap().unwrap();
        f.snapshots.clear().await;
        foreign.aggregate_id = id;
        f.snapshots.save(foreign).await.unwrap();

        let loaded = f.repository.load(id, &CommandContext::new()).await.unwrap();
        assert_eq!(loaded.snapshot_version, 0);
        assert_eq!(loaded.state.balance().value(), dec!(10));
    }

    #[tokio::test]
    async fn test_encrypted_snapshot_cannot_be_moved() {
        let key = MasterKey::new([3u8; 32]);
        let f = fixture(1, EventCodec::encrypted(key));
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        open(&f.repository, id, 10).await;
        open(&f.repository, other, 99).await;

        let mut foreign = f.snapshots.load(other).await.unwrap().unwrap();
        foreign.aggregate_id = id;
        f.snapshots.clear().await;
        f.snapshots.save(foreign).await.unwrap();

        let loaded = f.repository.load(id, &CommandContext::new()).await.unwrap();
        assert_eq!(loaded.snapshot_version, 0);
        assert_eq!(loaded.state.balance().value(), dec!(10));
    }

    #[tokio::test]
    async fn test_history_is_decoded_in_order() {
        let f = fixture(50, EventCodec::plain());
        let id = Uuid::new_v4();
        let tx = Uuid::new_v4();

        open(&f.repository, id, 10).await;
        f.repository
            .execute(
                id,
                1,
                &AccountCommand::withdraw(amount(4)),
                &CommandContext::new().with_transaction_id(tx),
            )
            .await
            .unwrap();

        let history = f.repository.history(id, &CommandContext::new()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence_number, 1);
        assert_eq!(history[0].event.event_type(), "AccountOpened");
        assert_eq!(history[1].transaction_id, Some(tx));
        assert_eq!(history[1].event.event_type(), "MoneyWithdrawn");
    }
}
