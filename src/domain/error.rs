//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Reasons a command is rejected by an aggregate.
///
/// These are business rule violations. They are reported to the caller as-is
/// and never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RejectedCommand {
    /// Withdrawal larger than the current balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    /// Closed accounts accept no further commands
    #[error("Account is closed: {0}")]
    AccountClosed(Uuid),

    /// Open on an account that already has history
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(Uuid),

    /// Command on an account that was never opened
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Close while money is still held
    #[error("Balance outstanding: {balance}")]
    BalanceOutstanding { balance: Decimal },

    /// Amount rejected by the domain rules (overflow, same-account transfer)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl RejectedCommand {
    pub fn insufficient_funds(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            requested,
            available,
        }
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AccountClosed(_) => "account_closed",
            Self::AccountAlreadyExists(_) => "account_already_exists",
            Self::AccountNotFound(_) => "account_not_found",
            Self::BalanceOutstanding { .. } => "balance_outstanding",
            Self::InvalidAmount(_) => "invalid_amount",
        }
    }
}

/// An event that cannot be folded into the state it was read against.
///
/// Only a corrupted or foreign event log produces this; it is never a
/// user error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct IntegrityViolation(pub String);

impl IntegrityViolation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
