//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened in the system.
//!
//! Every variant is a struct variant so that optional fields can be added
//! later with `#[serde(default)]` without breaking stored payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// Account was opened with an owner and a starting balance
    AccountOpened {
        owner_id: Uuid,
        initial_balance: Decimal,
    },

    /// Money was deposited; `balance` is the balance after the deposit
    MoneyDeposited { amount: Decimal, balance: Decimal },

    /// Money was withdrawn; `balance` is the balance after the withdrawal
    MoneyWithdrawn { amount: Decimal, balance: Decimal },

    /// Account was closed (terminal)
    AccountClosed {},
}

impl AccountEvent {
    pub const ACCOUNT_OPENED: &'static str = "AccountOpened";
    pub const MONEY_DEPOSITED: &'static str = "MoneyDeposited";
    pub const MONEY_WITHDRAWN: &'static str = "MoneyWithdrawn";
    pub const ACCOUNT_CLOSED: &'static str = "AccountClosed";

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened { .. } => Self::ACCOUNT_OPENED,
            AccountEvent::MoneyDeposited { .. } => Self::MONEY_DEPOSITED,
            AccountEvent::MoneyWithdrawn { .. } => Self::MONEY_WITHDRAWN,
            AccountEvent::AccountClosed { .. } => Self::ACCOUNT_CLOSED,
        }
    }
}
