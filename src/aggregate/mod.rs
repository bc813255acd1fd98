//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing.

pub mod account;

pub use account::{Account, AccountStatus};

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::domain::{IntegrityViolation, RejectedCommand};

/// An event type that can be stored in an aggregate's stream
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type name recorded next to the payload
    fn event_type(&self) -> &'static str;
}

/// Aggregate trait that all aggregates must implement
///
/// `decide` and `apply` are pure: they never perform I/O and identical
/// inputs always produce identical outputs.
pub trait Aggregate: Sized + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The type of events this aggregate handles
    type Event: DomainEvent;

    /// The commands this aggregate accepts
    type Command: Send + Sync;

    /// Get the aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Initial state of a stream with no events
    fn initial(id: Uuid) -> Self;

    /// Get the aggregate ID
    fn id(&self) -> Uuid;

    /// Get the current version (number of events applied)
    fn version(&self) -> i64;

    /// Validate a command against current state and produce the resulting events
    fn decide(&self, command: &Self::Command) -> Result<Vec<Self::Event>, RejectedCommand>;

    /// Fold a single event into state
    fn apply(self, event: &Self::Event) -> Result<Self, IntegrityViolation>;

    /// Fold a sequence of events in order
    fn apply_all<'a, I>(self, events: I) -> Result<Self, IntegrityViolation>
    where
        I: IntoIterator<Item = &'a Self::Event>,
    {
        events
            .into_iter()
            .try_fold(self, |aggregate, event| aggregate.apply(event))
    }
}
