//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Account, AccountStatus, Aggregate};
use crate::domain::{AccountCommand, AccountEvent, Amount, CommandContext};
use crate::error::{AppError, AppResult};
use crate::repository::HistoryEntry;
use crate::service::AccountService;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub expected_version: i64,
    pub command: AccountCommand,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub account_id: Uuid,
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub version: i64,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id(),
            owner_id: account.owner_id(),
            balance: account.balance().value(),
            status: account.status(),
            version: account.version(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub amount: Decimal,
    pub source_version: i64,
    pub target_version: i64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AccountService> {
    Router::new()
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/commands", post(handle_command))
        .route("/accounts/:account_id/events", get(get_account_events))
        .route("/transfers", post(transfer))
}

// =========================================================================
// Handlers
// =========================================================================

async fn handle_command(
    State(service): State<AccountService>,
    Extension(context): Extension<CommandContext>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<CommandRequest>,
) -> AppResult<Json<CommandResponse>> {
    let version = service
        .handle_command(account_id, request.expected_version, request.command, &context)
        .await?;

    Ok(Json(CommandResponse { account_id, version }))
}

async fn get_account(
    State(service): State<AccountService>,
    Extension(context): Extension<CommandContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<AccountResponse>> {
    let account = service.query_state(account_id, &context).await?;
    Ok(Json(account.into()))
}

async fn get_account_events(
    State(service): State<AccountService>,
    Extension(context): Extension<CommandContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryEntry<AccountEvent>>>> {
    let events = service.events(account_id, &context).await?;
    Ok(Json(events))
}

async fn transfer(
    State(service): State<AccountService>,
    Extension(context): Extension<CommandContext>,
    Json(request): Json<TransferRequest>,
) -> AppResult<Json<TransferResponse>> {
    let amount: Amount = request
        .amount
        .parse()
        .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

    let receipt = service
        .transfer(request.source_account_id, request.target_account_id, amount, &context)
        .await?;

    Ok(Json(TransferResponse {
        source_account_id: request.source_account_id,
        target_account_id: request.target_account_id,
        amount: amount.value(),
        source_version: receipt.source_version,
        target_version: receipt.target_version,
    }))
}
