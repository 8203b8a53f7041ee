//! Error types and HTTP error response handling.
//!
//! Two layers of errors live here:
//!
//! - [`StoreError`]: what a Ledger Store reports for a single call
//! - [`LedgerError`]: what the services return to their callers, carrying the
//!   [`Operation`] that failed so the failing precondition can be
//!   reconstructed without reading logs
//!
//! Retry decisions switch on [`LedgerError::transient_class`], never on
//! error text.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;

use crate::models::{account::AccountId, transaction::Transaction};

/// Failure of a single Ledger Store call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The call did not finish before the context deadline.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The storage engine aborted the call to break a lock cycle.
    #[error("deadlock detected")]
    DeadlockDetected,

    /// The caller cancelled the context.
    #[error("operation cancelled")]
    Cancelled,

    #[error("account {0} already exists")]
    AlreadyExists(AccountId),

    #[error("account {0} not found")]
    NotFound(AccountId),

    /// Reported by atomic transfers, which re-check the balance under lock.
    #[error("insufficient balance in account {account_id}: balance {balance}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: Decimal,
    },

    /// Any other database failure, preserved for diagnostics.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Store reachable but unable to serve (in-memory store faults, poisoned state).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// PostgreSQL SQLSTATE for `deadlock_detected`.
const PG_DEADLOCK_DETECTED: &str = "40P01";

/// Classify sqlx errors into the closed store taxonomy.
///
/// - Pool acquire timeouts count as an exceeded deadline
/// - SQLSTATE 40P01 is a deadlock
/// - Everything else is kept as-is
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => StoreError::DeadlineExceeded,
            sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_DEADLOCK_DETECTED) => {
                StoreError::DeadlockDetected
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Error classes the retry policy is allowed to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientClass {
    DeadlineExceeded,
    DeadlockDetected,
}

/// The operation a [`LedgerError`] belongs to, with the ids and amounts involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateAccount { account_id: AccountId },
    GetAccount { account_id: AccountId },
    UpdateBalance { account_id: AccountId },
    Transfer(Transaction),
    Debit { account_id: AccountId, amount: Decimal },
    Credit { account_id: AccountId, amount: Decimal },
    RecordTransaction(Transaction),
    Restore { account_id: AccountId, balance: Decimal },
    Ping,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAccount { account_id } => write!(f, "create account {account_id}"),
            Operation::GetAccount { account_id } => write!(f, "get account {account_id}"),
            Operation::UpdateBalance { account_id } => {
                write!(f, "update balance of account {account_id}")
            }
            Operation::Transfer(tx) => write!(f, "transfer {tx}"),
            Operation::Debit { account_id, amount } => {
                write!(f, "debit {amount} from account {account_id}")
            }
            Operation::Credit { account_id, amount } => {
                write!(f, "credit {amount} to account {account_id}")
            }
            Operation::RecordTransaction(tx) => write!(f, "record transaction {tx}"),
            Operation::Restore {
                account_id,
                balance,
            } => write!(f, "restore account {account_id} to {balance}"),
            Operation::Ping => f.write_str("ping store"),
        }
    }
}

/// Error returned by the account and transfer services.
///
/// # Error Categories
///
/// - **Validation**: `InvalidAmount`, `SameAccount`, `AccountNotFound`,
///   `AlreadyExists`, `InsufficientBalance`. Terminal, never retried.
/// - **Storage**: `Store`. Retried when the cause is transient.
/// - **Retry exhaustion**: `RetriesExhausted`, wrapping the last transient cause.
/// - **Compensation failure**: `CompensationFailed`. The ledger may be
///   inconsistent and needs manual reconciliation.
/// - **Cancellation**: `Cancelled`.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        amount: Decimal,
        reason: &'static str,
    },

    #[error("cannot transfer from account {account_id} to itself")]
    SameAccount { account_id: AccountId },

    #[error("account {account_id} not found")]
    AccountNotFound { account_id: AccountId },

    #[error("account {account_id} already exists")]
    AlreadyExists { account_id: AccountId },

    #[error(
        "insufficient balance in account {account_id}: balance {balance}, requested {requested}"
    )]
    InsufficientBalance {
        account_id: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("{operation} failed: {source}")]
    Store {
        operation: Operation,
        #[source]
        source: StoreError,
    },

    #[error("{operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: Operation,
        attempts: u32,
        #[source]
        last: Box<LedgerError>,
    },

    /// Rolling back a partially applied transfer failed.
    ///
    /// `cause` is the failure that triggered compensation; `compensation` is
    /// the restore that could not be written.
    #[error(
        "compensation failed for transfer {transfer} after: {cause}; ledger requires manual reconciliation"
    )]
    CompensationFailed {
        transfer: Transaction,
        cause: Box<LedgerError>,
        #[source]
        compensation: Box<LedgerError>,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: Operation },
}

impl LedgerError {
    /// Wrap a store failure with the operation it happened in.
    ///
    /// Cancellation observed by the store becomes [`LedgerError::Cancelled`].
    pub fn store(operation: Operation, source: StoreError) -> Self {
        match source {
            StoreError::Cancelled => LedgerError::Cancelled { operation },
            source => LedgerError::Store { operation, source },
        }
    }

    /// Transient class of this error, if the retry policy may replay it.
    pub fn transient_class(&self) -> Option<TransientClass> {
        match self {
            LedgerError::Store {
                source: StoreError::DeadlineExceeded,
                ..
            } => Some(TransientClass::DeadlineExceeded),
            LedgerError::Store {
                source: StoreError::DeadlockDetected,
                ..
            } => Some(TransientClass::DeadlockDetected),
            _ => None,
        }
    }

    /// Whether the ledger may be left inconsistent by this failure.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, LedgerError::CompensationFailed { .. })
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount { .. } => "invalid_amount",
            LedgerError::SameAccount { .. } => "same_account",
            LedgerError::AccountNotFound { .. } => "account_not_found",
            LedgerError::AlreadyExists { .. } => "account_exists",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::RetriesExhausted { .. } => "store_unavailable",
            LedgerError::CompensationFailed { .. } => "compensation_failed",
            LedgerError::Cancelled { .. } => "cancelled",
            LedgerError::Store { .. } => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            LedgerError::InvalidAmount { .. } | LedgerError::SameAccount { .. } => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::AlreadyExists { .. } => StatusCode::CONFLICT,
            LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Cancelled { .. } => StatusCode::REQUEST_TIMEOUT,
            LedgerError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::CompensationFailed { .. } | LedgerError::Store { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert LedgerError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_balance",
///     "message": "insufficient balance in account 1: balance 70.00, requested 1000.00"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidAmount`, `SameAccount` → 400 Bad Request
/// - `AccountNotFound` → 404 Not Found
/// - `AlreadyExists` → 409 Conflict
/// - `InsufficientBalance` → 422 Unprocessable Entity
/// - `Cancelled` → 408 Request Timeout
/// - `RetriesExhausted` → 503 Service Unavailable
/// - `CompensationFailed`, `Store` → 500 Internal Server Error (storage details hidden)
impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            LedgerError::Store { .. } => "An internal error occurred".to_string(),
            LedgerError::RetriesExhausted { .. } => {
                "Storage is temporarily unavailable, try again later".to_string()
            }
            LedgerError::CompensationFailed { ref transfer, .. } => format!(
                "Transfer {transfer} failed and could not be rolled back; escalated for reconciliation"
            ),
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
