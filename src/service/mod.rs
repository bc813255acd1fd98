//! Account Service
//!
//! The command and query surface over the account repository: single-account
//! commands, state queries, transfers between two accounts and the event
//! history of an account.


use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate};
use crate::domain::{AccountCommand, AccountEvent, Amount, CommandContext, RejectedCommand};
use crate::repository::{AggregateRepository, HistoryEntry, PendingChange, RepositoryError};

/// Versions both accounts reached after a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub source_version: i64,
    pub target_version: i64,
}

/// Entry point for account commands and queries
#[derive(Clone)]
pub struct AccountService {
    repository: AggregateRepository<Account>,
}

impl AccountService {
    pub fn new(repository: AggregateRepository<Account>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &AggregateRepository<Account> {
        &self.repository
    }

    /// Apply `command` to the account at `expected_version`; returns the new version
    pub async fn handle_command(
        &self,
        account_id: Uuid,
        expected_version: i64,
        command: AccountCommand,
        ctx: &CommandContext,
    ) -> Result<i64, RepositoryError> {
        let version = self
            .repository
            .execute(account_id, expected_version, &command, ctx)
            .await?;

        tracing::info!(
            account_id = %account_id,
            command = command.name(),
            version,
            correlation_id = ?ctx.correlation_id,
            "Command handled"
        );

        Ok(version)
    }

    /// Current state of an account that has been opened
    pub async fn query_state(&self, account_id: Uuid, ctx: &CommandContext) -> Result<Account, RepositoryError> {
        self.repository.query(account_id, ctx).await
    }

    /// Move `amount` from `source_id` to `target_id`.
    ///
    /// Both streams are appended in one batch at the versions they were loaded
    /// at: either both accounts change or neither does. A conflict on either
    /// account is returned to the caller.
    pub async fn transfer(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        amount: Amount,
        ctx: &CommandContext,
    ) -> Result<TransferReceipt, RepositoryError> {
        if source_id == target_id {
            return Err(RejectedCommand::InvalidAmount("Cannot transfer to the same account".to_string()).into());
        }

        let ctx = self.repository.bounded(ctx);
        let source = self.repository.load(source_id, &ctx).await?;
        let target = self.repository.load(target_id, &ctx).await?;

        if self.repository.is_duplicate(source_id, &ctx).await? {
            tracing::info!(
                source_id = %source_id,
                target_id = %target_id,
                transaction_id = ?ctx.transaction_id,
                "Duplicate transfer, nothing appended"
            );
            return Ok(TransferReceipt {
                source_version: source.version(),
                target_version: target.version(),
            });
        }

        let debit = source.state.decide(&AccountCommand::withdraw(amount))?;
        let credit = target.state.decide(&AccountCommand::deposit(amount))?;

        let versions = self
            .repository
            .commit(
                vec![PendingChange::new(source, debit), PendingChange::new(target, credit)],
                &ctx,
            )
            .await?;

        let [source_version, target_version] = versions[..] else {
            return Err(RepositoryError::integrity(source_id, "transfer commit returned wrong version count"));
        };

        tracing::info!(
            source_id = %source_id,
            target_id = %target_id,
            amount = %amount,
            source_version,
            target_version,
            correlation_id = ?ctx.correlation_id,
            "Transfer completed"
        );

        Ok(TransferReceipt {
            source_version,
            target_version,
        })
    }

    /// Decoded event history of an account
    pub async fn events(
        &self,
        account_id: Uuid,
        ctx: &CommandContext,
    ) -> Result<Vec<HistoryEntry<AccountEvent>>, RepositoryError> {
        self.repository.history(account_id, ctx).await
    }
}
