//! Account routes.
//!
//! - POST /api/v1/accounts - Open an account with a starting balance
//! - GET /api/v1/accounts/{account_id} - Read one account
//! - PUT /api/v1/accounts/{account_id} - Administrative balance correction

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::AppState;
use crate::{
    context::OpContext,
    error::LedgerError,
    models::account::{Account, AccountId, CreateAccountRequest, UpdateBalanceRequest},
};

/// Open an account.
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": 1,
///   "initial_balance": "100.00"
/// }
/// ```
///
/// # Responses
///
/// - **201**: the stored account
/// - **400**: negative initial balance
/// - **409**: account id already taken
///
/// ```json
/// {
///   "account_id": 1,
///   "balance": "100.00"
/// }
/// ```
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), LedgerError> {
    let account = state
        .accounts
        .create_account(
            &OpContext::background(),
            request.account_id,
            request.initial_balance,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// Read an account's current balance.
///
/// Responds 404 when no account has this id.
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Account>, LedgerError> {
    let account = state
        .accounts
        .get_account(&OpContext::background(), account_id)
        .await?
        // Absence is a valid lookup result; only here does it become a 404
        .ok_or(LedgerError::AccountNotFound { account_id })?;

    Ok(Json(account))
}

/// Overwrite the balance of an account.
///
/// # Request Body
///
/// ```json
/// {
///   "balance": "250.00"
/// }
/// ```
///
/// Administrative correction only: no transaction record is written.
pub async fn update_balance(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<UpdateBalanceRequest>,
) -> Result<Json<Account>, LedgerError> {
    let account = state
        .accounts
        .update_balance(&OpContext::background(), account_id, request.balance)
        .await?;

    Ok(Json(account))
}
