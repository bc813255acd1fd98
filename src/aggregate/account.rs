//! Account Aggregate
//!
//! Account is the core aggregate of the ledger. `decide` turns commands into
//! events, `apply` folds events into state. State is derived from events,
//! never directly mutated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountCommand, AccountEvent, Amount, Balance, IntegrityViolation, RejectedCommand};

use super::{Aggregate, DomainEvent};

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Uninitialized,
    Open,
    Closed,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Uninitialized
    }
}

/// Account Aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,

    /// Set once the account is opened
    owner_id: Option<Uuid>,

    balance: Balance,

    status: AccountStatus,

    /// Number of events applied
    version: i64,
}

impl Account {
    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == AccountStatus::Open
    }

    fn decide_open(&self, owner_id: Uuid, initial_balance: &Balance) -> Vec<AccountEvent> {
        vec![AccountEvent::AccountOpened {
            owner_id,
            initial_balance: initial_balance.value(),
        }]
    }

    fn decide_deposit(&self, amount: &Amount) -> Result<Vec<AccountEvent>, RejectedCommand> {
        let balance = self
            .balance
            .credit(amount)
            .map_err(|e| RejectedCommand::InvalidAmount(e.to_string()))?;

        Ok(vec![AccountEvent::MoneyDeposited {
            amount: amount.value(),
            balance: balance.value(),
        }])
    }

    fn decide_withdraw(&self, amount: &Amount) -> Result<Vec<AccountEvent>, RejectedCommand> {
        if !self.balance.is_sufficient_for(amount) {
            return Err(RejectedCommand::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }
        let balance = self
            .balance
            .debit(amount)
            .map_err(|e| RejectedCommand::InvalidAmount(e.to_string()))?;

        Ok(vec![AccountEvent::MoneyWithdrawn {
            amount: amount.value(),
            balance: balance.value(),
        }])
    }

    fn decide_close(&self) -> Result<Vec<AccountEvent>, RejectedCommand> {
        if !self.balance.is_zero() {
            return Err(RejectedCommand::BalanceOutstanding {
                balance: self.balance.value(),
            });
        }
        Ok(vec![AccountEvent::AccountClosed {}])
    }

    fn violation(&self, event: &AccountEvent, reason: impl std::fmt::Display) -> IntegrityViolation {
        IntegrityViolation::new(format!(
            "{} cannot be applied to account {} at version {} ({:?}): {}",
            event.event_type(),
            self.id,
            self.version,
            self.status,
            reason
        ))
    }

    /// Balance after moving `amount`, checked against the balance the event recorded
    fn checked_balance(
        &self,
        event: &AccountEvent,
        expected: Decimal,
        recorded: Decimal,
    ) -> Result<Balance, IntegrityViolation> {
        if expected != recorded {
            return Err(self.violation(
                event,
                format!("recorded balance {recorded} does not match computed {expected}"),
            ));
        }
        Balance::new(recorded).map_err(|e| self.violation(event, e))
    }
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        AccountEvent::event_type(self)
    }
}

impl Aggregate for Account {
    type Event = AccountEvent;
    type Command = AccountCommand;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn initial(id: Uuid) -> Self {
        Self {
            id,
            owner_id: None,
            balance: Balance::zero(),
            status: AccountStatus::Uninitialized,
            version: 0,
        }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn decide(&self, command: &AccountCommand) -> Result<Vec<AccountEvent>, RejectedCommand> {
        match (self.status, command) {
            (AccountStatus::Closed, _) => Err(RejectedCommand::AccountClosed(self.id)),

            (
                AccountStatus::Uninitialized,
                AccountCommand::Open {
                    owner_id,
                    initial_balance,
                },
            ) => Ok(self.decide_open(*owner_id, initial_balance)),
            (AccountStatus::Uninitialized, _) => Err(RejectedCommand::AccountNotFound(self.id)),

            (AccountStatus::Open, AccountCommand::Open { .. }) => {
                Err(RejectedCommand::AccountAlreadyExists(self.id))
            }
            (AccountStatus::Open, AccountCommand::Deposit { amount }) => self.decide_deposit(amount),
            (AccountStatus::Open, AccountCommand::Withdraw { amount }) => self.decide_withdraw(amount),
            (AccountStatus::Open, AccountCommand::Close) => self.decide_close(),
        }
    }

    fn apply(mut self, event: &AccountEvent) -> Result<Self, IntegrityViolation> {
        match (self.status, event) {
            (
                AccountStatus::Uninitialized,
                AccountEvent::AccountOpened {
                    owner_id,
                    initial_balance,
                },
            ) => {
                self.balance = Balance::new(*initial_balance).map_err(|e| self.violation(event, e))?;
                self.owner_id = Some(*owner_id);
                self.status = AccountStatus::Open;
            }

            (AccountStatus::Open, AccountEvent::MoneyDeposited { amount, balance }) => {
                let amount = Amount::new(*amount).map_err(|e| self.violation(event, e))?;
                self.balance = self.checked_balance(event, self.balance.value() + amount.value(), *balance)?;
            }

            (AccountStatus::Open, AccountEvent::MoneyWithdrawn { amount, balance }) => {
                let amount = Amount::new(*amount).map_err(|e| self.violation(event, e))?;
                self.balance = self.checked_balance(event, self.balance.value() - amount.value(), *balance)?;
            }

            (AccountStatus::Open, AccountEvent::AccountClosed {}) => {
                self.status = AccountStatus::Closed;
            }

            (status, _) => {
                return Err(self.violation(event, format!("not valid in status {status:?}")));
            }
        }

        self.version += 1;
        Ok(self)
    }
}
