//! Command Context
//!
//! Per-call metadata: the caller's transaction id for duplicate detection,
//! a correlation id for tracing, and the deadline store calls must respect.

use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Context for a single command or query.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Caller-supplied id; a command whose id is already in the stream is a no-op
    pub transaction_id: Option<Uuid>,

    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    /// Point in time after which store calls are abandoned
    pub deadline: Option<Instant>,
}

impl CommandContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let transaction_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = CommandContext::new()
            .with_transaction_id(transaction_id)
            .with_correlation_id(correlation_id);

        assert_eq!(context.transaction_id, Some(transaction_id));
        assert_eq!(context.correlation_id, Some(correlation_id));
        assert!(context.deadline.is_none());
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = CommandContext::new();
        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));
        assert_eq!(context.ensure_correlation_id(), id);
    }

    #[tokio::test]
    async fn test_with_timeout_sets_future_deadline() {
        let context = CommandContext::new().with_timeout(Duration::from_secs(5));
        assert!(context.deadline.unwrap() > Instant::now());
    }
}
