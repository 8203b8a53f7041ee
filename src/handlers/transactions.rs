//! Transfer HTTP handlers.
//!
//! - POST /api/v1/transactions - Move money between accounts

use axum::{Json, extract::State, http::StatusCode};

use super::AppState;
use crate::{
    context::OpContext,
    error::LedgerError,
    models::transaction::{Transaction, TransferRequest},
};

/// Transfer money between accounts.
///
/// # Request Body
///
/// ```json
/// {
///   "source_account_id": 1,
///   "destination_account_id": 2,
///   "amount": "30.00"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "source_account_id": 1,
///   "destination_account_id": 2,
///   "amount": "30.00"
/// }
/// ```
///
/// # Atomicity
///
/// Both balances and the transaction record change together or not at all.
/// A 500 with code `compensation_failed` means that guarantee could not be
/// kept and the transfer has been escalated for reconciliation.
pub async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<Transaction>), LedgerError> {
    let transaction = state
        .transfers
        .perform_transfer(
            &OpContext::background(),
            request.source_account_id,
            request.destination_account_id,
            request.amount,
        )
        .await
        .inspect_err(|err| {
            if err.needs_reconciliation() {
                tracing::error!(error = %err, "Transfer left ledger inconsistent");
            }
        })?;

    Ok((StatusCode::CREATED, Json(transaction)))
}
