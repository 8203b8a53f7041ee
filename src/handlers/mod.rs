//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params)
//! 2. Delegates to the account or transfer service
//! 3. Returns HTTP response (JSON, status code)

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    services::{AccountService, TransferService},
    store::LedgerStore,
};

/// Account management endpoints
pub mod accounts;
/// Service health endpoint
pub mod health;
/// Transfer endpoints
pub mod transactions;

/// State shared with every handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub transfers: Arc<TransferService>,
    pub store: Arc<dyn LedgerStore>,
}

/// Build the application router.
///
/// # Routes
///
/// - `GET /health`
/// - `POST /api/v1/accounts`
/// - `GET /api/v1/accounts/{account_id}`
/// - `PUT /api/v1/accounts/{account_id}`
/// - `POST /api/v1/transactions`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Account management routes
        .route("/api/v1/accounts", post(accounts::create_account))
        .route(
            "/api/v1/accounts/{account_id}",
            get(accounts::get_account).put(accounts::update_balance),
        )
        // Transfer routes
        .route("/api/v1/transactions", post(transactions::create_transfer))
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
