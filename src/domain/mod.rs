//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod commands;
pub mod context;
pub mod error;
pub mod events;

pub use amount::{Amount, AmountError, Balance};
pub use commands::AccountCommand;
pub use context::CommandContext;
pub use error::{IntegrityViolation, RejectedCommand};
pub use events::AccountEvent;
