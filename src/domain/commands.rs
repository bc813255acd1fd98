//! Command definitions
//!
//! Commands represent intentions to change an account. They carry already
//! validated amounts; parsing happens at the edge.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Balance};

/// Command addressed to a single account aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountCommand {
    /// Open a new account
    Open {
        owner_id: Uuid,
        #[serde(default)]
        initial_balance: Balance,
    },

    /// Deposit money
    Deposit { amount: Amount },

    /// Withdraw money
    Withdraw { amount: Amount },

    /// Close the account
    Close,
}

impl AccountCommand {
    pub fn open(owner_id: Uuid, initial_balance: Balance) -> Self {
        Self::Open {
            owner_id,
            initial_balance,
        }
    }

    pub fn deposit(amount: Amount) -> Self {
        Self::Deposit { amount }
    }

    pub fn withdraw(amount: Amount) -> Self {
        Self::Withdraw { amount }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Close => "close",
        }
    }
}
