//! ledger_es Library
//!
//! Event-sourced account ledger: an append-only event store with optimistic
//! concurrency, encrypted payloads and snapshot-accelerated replay.

pub mod aggregate;
pub mod api;
pub mod codec;
pub mod domain;
pub mod event_store;
pub mod repository;
pub mod service;
pub mod snapshot_store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{AccountCommand, AccountEvent, Amount, AmountError, Balance, CommandContext, RejectedCommand};
pub use repository::{AggregateRepository, RepositoryError};
pub use service::AccountService;
