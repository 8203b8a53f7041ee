//! Liveness check: reports whether the ledger store answers.

use std::time::Duration;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::{
    context::OpContext,
    error::{LedgerError, Operation},
};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of a successful health check.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
///
/// Pings the store with a short deadline.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "store": "connected",
///   "timestamp": "2026-03-02T09:15:00Z"
/// }
/// ```
///
/// An unreachable store yields the usual error body instead.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, LedgerError> {
    let ctx = OpContext::background().with_timeout(PING_TIMEOUT);
    state
        .store
        .ping(&ctx)
        .await
        .map_err(|e| LedgerError::store(Operation::Ping, e))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        store: "connected".to_string(),
        timestamp: Utc::now(),
    }))
}
